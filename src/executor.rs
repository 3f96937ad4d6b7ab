use log::error;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::SiteGridError;

/// Executes sub-grid batch retrieval on the caller thread or on a thread pool.
///
/// The rayon thread pool is not exposed directly so that callers do not
/// depend on its API.
pub enum Executor {
    /// Single thread variant of an Executor
    SingleThread,
    /// Thread pool variant of an Executor
    ThreadPool(ThreadPool),
}

impl Executor {
    /// Creates an Executor that performs all task in the caller thread.
    pub fn single_thread() -> Executor {
        Executor::SingleThread
    }

    /// Creates an Executor that dispatches the tasks in a thread pool.
    pub fn multi_thread(num_threads: usize, prefix: &'static str) -> crate::Result<Executor> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(move |num| format!("{prefix}{num}"))
            .build()?;
        Ok(Executor::ThreadPool(pool))
    }

    /// Creates the executor matching a number of retrieval threads.
    pub fn with_num_threads(num_threads: usize) -> crate::Result<Executor> {
        if num_threads <= 1 {
            Ok(Executor::single_thread())
        } else {
            Executor::multi_thread(num_threads, "retrieval-")
        }
    }

    /// Perform a map in the thread pool.
    ///
    /// Results are returned in the order of `args`. The first error
    /// encountered is returned, but every task still runs to completion.
    ///
    /// Regardless of the executor (`SingleThread` or `ThreadPool`), panics in the task
    /// will propagate to the caller.
    pub fn map<A, R, AIterator, F>(&self, f: F, args: AIterator) -> crate::Result<Vec<R>>
    where
        A: Send,
        R: Send,
        AIterator: Iterator<Item = A>,
        F: Sized + Sync + Fn(A) -> crate::Result<R>,
    {
        match self {
            Executor::SingleThread => args.map(f).collect::<crate::Result<_>>(),
            Executor::ThreadPool(pool) => {
                let args: Vec<A> = args.collect();
                let num_fruits = args.len();
                let fruit_receiver = {
                    let (fruit_sender, fruit_receiver) = crossbeam_channel::unbounded();
                    pool.scope(|scope| {
                        for (idx, arg) in args.into_iter().enumerate() {
                            // Borrowed, not moved: every task shares them.
                            let f_ref = &f;
                            let fruit_sender_ref = &fruit_sender;
                            scope.spawn(move |_| {
                                let fruit = f_ref(arg);
                                if let Err(err) = fruit_sender_ref.send((idx, fruit)) {
                                    error!(
                                        "Failed to send retrieval result. It probably means all \
                                         retrieval threads have panicked. {err:?}"
                                    );
                                }
                            });
                        }
                    });
                    // Dropping the sender here lets the iteration below terminate.
                    fruit_receiver
                };
                let mut result_placeholders: Vec<Option<R>> =
                    std::iter::repeat_with(|| None).take(num_fruits).collect();
                let mut first_error = None;
                for (pos, fruit_res) in fruit_receiver {
                    match fruit_res {
                        Ok(fruit) => result_placeholders[pos] = Some(fruit),
                        Err(err) => {
                            first_error.get_or_insert(err);
                        }
                    }
                }
                if let Some(err) = first_error {
                    return Err(err);
                }
                let results: Vec<R> = result_placeholders.into_iter().flatten().collect();
                if results.len() != num_fruits {
                    return Err(SiteGridError::ErrorInThread(
                        "One of the mapped execution failed.".to_string(),
                    ));
                }
                Ok(results)
            }
        }
    }
}
