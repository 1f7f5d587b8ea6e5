//! Station abstraction and runner for worker threads.

use crossbeam_channel::{Receiver, Sender};
use std::marker::PhantomData;
use std::thread::{self, JoinHandle};

/// A processing station.
///
/// Each station receives input, processes it, and produces output.
/// Stations run in their own threads and are connected by channels; several
/// runners may share one input receiver to form a pool.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item. `None` produces no output.
    fn process(&mut self, input: Self::Input) -> Option<Self::Output>;

    /// Returns the name of this station for thread names and error reporting.
    fn name(&self) -> &'static str;

    /// Called when the station is shutting down.
    fn shutdown(&mut self) {}
}

/// Runs a station in a dedicated thread.
pub struct StationRunner<S: Station> {
    handle: Option<JoinHandle<()>>,
    thread_name: String,
    _phantom: PhantomData<S>,
}

impl<S: Station> StationRunner<S> {
    /// Spawns `station` on a thread named `<station name>-<ordinal>`.
    ///
    /// The thread exits when the input channel is closed and drained, or
    /// when the output channel is closed.
    pub fn spawn(
        mut station: S,
        ordinal: usize,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
    ) -> std::io::Result<Self> {
        let thread_name = format!("{}-{}", station.name(), ordinal);

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                Self::run_station(&mut station, input_rx, output_tx);
            })?;

        Ok(Self {
            handle: Some(handle),
            thread_name,
            _phantom: PhantomData,
        })
    }

    fn run_station(station: &mut S, input_rx: Receiver<S::Input>, output_tx: Sender<S::Output>) {
        while let Ok(input) = input_rx.recv() {
            if let Some(output) = station.process(input)
                && output_tx.send(output).is_err()
            {
                // Consumer gone
                break;
            }
        }

        station.shutdown();
    }

    /// Waits for the station thread to complete.
    pub fn join(mut self) -> Result<(), String> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| format!("Station thread '{}' panicked", self.thread_name)),
            None => Ok(()),
        }
    }

    /// Returns the thread name of this runner.
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Sums token lengths of a pretend batch
    struct WidthStation {
        shutdowns: Arc<AtomicUsize>,
    }

    impl Station for WidthStation {
        type Input = Vec<usize>;
        type Output = usize;

        fn process(&mut self, input: Vec<usize>) -> Option<usize> {
            if input.is_empty() {
                None
            } else {
                Some(input.iter().sum())
            }
        }

        fn name(&self) -> &'static str {
            "width"
        }

        fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn station(shutdowns: &Arc<AtomicUsize>) -> WidthStation {
        WidthStation {
            shutdowns: shutdowns.clone(),
        }
    }

    #[test]
    fn test_runner_processes_and_skips_empty_output() {
        let (input_tx, input_rx) = bounded(4);
        let (output_tx, output_rx) = bounded(4);
        let shutdowns = Arc::new(AtomicUsize::new(0));

        let runner = StationRunner::spawn(station(&shutdowns), 0, input_rx, output_tx).unwrap();
        assert_eq!(runner.thread_name(), "width-0");

        input_tx.send(vec![1, 2]).unwrap();
        input_tx.send(vec![]).unwrap();
        input_tx.send(vec![5]).unwrap();
        drop(input_tx);

        let outputs: Vec<usize> = output_rx.iter().collect();
        assert_eq!(outputs, vec![3, 5]);

        runner.join().unwrap();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pool_of_runners_shares_one_input_channel() {
        let (input_tx, input_rx) = bounded(16);
        let (output_tx, output_rx) = bounded(16);
        let shutdowns = Arc::new(AtomicUsize::new(0));

        let runners: Vec<_> = (0..3)
            .map(|i| {
                StationRunner::spawn(station(&shutdowns), i, input_rx.clone(), output_tx.clone())
                    .unwrap()
            })
            .collect();
        drop(output_tx);

        for i in 1..=10 {
            input_tx.send(vec![i]).unwrap();
        }
        drop(input_tx);

        let mut outputs: Vec<usize> = output_rx.iter().collect();
        outputs.sort();
        assert_eq!(outputs, (1..=10).collect::<Vec<_>>());

        for runner in runners {
            runner.join().unwrap();
        }
        assert_eq!(shutdowns.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_runner_stops_when_output_closed() {
        let (input_tx, input_rx) = bounded(4);
        let (output_tx, output_rx) = bounded(4);
        let shutdowns = Arc::new(AtomicUsize::new(0));

        let runner = StationRunner::spawn(station(&shutdowns), 0, input_rx, output_tx).unwrap();
        drop(output_rx);
        input_tx.send(vec![1]).unwrap();

        runner.join().unwrap();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }
}
