//! Resource thread.
//!
//! Backend contexts are bound to the thread that created them, so every
//! backend call goes through one worker thread owned by a [`RenderServer`].
//! The worker builds its context `C` (typically a
//! [`Renderer`](crate::renderer::Renderer)) itself and then runs submitted
//! tasks against it in FIFO order. Submitting never blocks; only
//! [`Future::get`] and [`Future::wait`] do.

use crate::error::{RenderError, RenderResult};
use crate::RenderConfig;
use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Unit of work run on the resource thread.
pub trait Task<C>: Send {
    fn run(self: Box<Self>, context: &mut C);
}

struct Shared<T> {
    result: Mutex<Option<RenderResult<T>>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn set(&self, result: RenderResult<T>) {
        *self.result.lock() = Some(result);
        self.ready.notify_all();
    }
}

/// Result of a task that may not have run yet.
pub struct Future<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Future<T> {
    /// Whether the future still refers to a result, i.e. `get` was not called.
    pub fn valid(&self) -> bool {
        self.shared.is_some()
    }

    /// Whether the task finished.
    pub fn is_ready(&self) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|shared| shared.result.lock().is_some())
    }

    /// Block until the task finished.
    pub fn wait(&self) {
        if let Some(shared) = self.shared.as_ref() {
            let mut result = shared.result.lock();
            while result.is_none() {
                shared.ready.wait(&mut result);
            }
        }
    }

    /// Block until the task finished and take its result.
    ///
    /// The future is no longer [`valid`](Self::valid) afterwards.
    pub fn get(&mut self) -> RenderResult<T> {
        let shared = self.shared.take().ok_or(RenderError::FutureInvalid)?;
        let mut result = shared.result.lock();
        loop {
            if let Some(result) = result.take() {
                return result;
            }
            shared.ready.wait(&mut result);
        }
    }
}

/// Completes its future with [`RenderError::ServerShutdown`] if dropped
/// before the task ran.
struct Promise<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Promise<T> {
    fn complete(mut self, result: RenderResult<T>) {
        if let Some(shared) = self.shared.take() {
            shared.set(result);
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.set(Err(RenderError::ServerShutdown));
        }
    }
}

/// Task wrapping a closure whose result is delivered through a [`Future`].
pub struct FutureTask<C, F, T> {
    func: F,
    promise: Promise<T>,
    _context: PhantomData<fn(&mut C)>,
}

impl<C, F, T> FutureTask<C, F, T>
where
    F: FnOnce(&mut C) -> RenderResult<T> + Send,
    T: Send,
{
    /// Wrap `func` in a task and return the future of its result.
    pub fn new(func: F) -> (Self, Future<T>) {
        let shared = Arc::new(Shared::new());
        let task = Self {
            func,
            promise: Promise {
                shared: Some(shared.clone()),
            },
            _context: PhantomData,
        };
        (task, Future { shared: Some(shared) })
    }
}

impl<C, F, T> Task<C> for FutureTask<C, F, T>
where
    F: FnOnce(&mut C) -> RenderResult<T> + Send,
    T: Send,
{
    fn run(self: Box<Self>, context: &mut C) {
        let Self { func, promise, .. } = *self;
        let result = catch_unwind(AssertUnwindSafe(|| func(context)))
            .unwrap_or_else(|payload| Err(RenderError::TaskPanicked(panic_message(payload.as_ref()))));
        promise.complete(result);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Owner of the resource thread.
pub struct RenderServer<C: 'static> {
    sender: Option<Sender<Box<dyn Task<C>>>>,
    join: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<C: 'static> RenderServer<C> {
    /// Spawn the resource thread; it builds its context with `init`.
    pub fn start<I>(config: &RenderConfig, init: I) -> RenderResult<Self>
    where
        I: FnOnce() -> C + Send + 'static,
    {
        let (sender, receiver) = unbounded::<Box<dyn Task<C>>>();
        let join = Arc::new(AtomicBool::new(false));
        let worker_join = join.clone();

        let worker = std::thread::Builder::new()
            .name(config.resource_thread_name.clone())
            .spawn(move || {
                log::info!("resource thread started");
                let mut context = init();
                while let Ok(task) = receiver.recv() {
                    task.run(&mut context);
                    if worker_join.load(Ordering::Acquire) && receiver.is_empty() {
                        break;
                    }
                }
                log::info!("resource thread stopped");
            })
            .map_err(|err| RenderError::ThreadSpawnFailed(err.to_string()))?;

        Ok(Self {
            sender: Some(sender),
            join,
            worker: Some(worker),
        })
    }

    /// Queue `func` on the resource thread.
    ///
    /// The returned future yields what `func` returned; a panic inside
    /// `func` surfaces as [`RenderError::TaskPanicked`].
    pub fn spawn_resource_task<F, T>(&self, func: F) -> Future<T>
    where
        F: FnOnce(&mut C) -> RenderResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (task, future) = FutureTask::new(func);
        self.spawn_task(Box::new(task));
        future
    }

    /// Queue a task without a future.
    ///
    /// Tasks submitted after shutdown are dropped without running.
    pub fn spawn_task(&self, task: Box<dyn Task<C>>) {
        match self.sender.as_ref() {
            Some(sender) => {
                if sender.send(task).is_err() {
                    log::warn!("resource thread is gone, dropping task");
                }
            }
            None => log::warn!("render server is shut down, dropping task"),
        }
    }

    /// Whether the resource thread is still alive.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Let the worker finish every queued task, then join it.
    pub fn shutdown(&mut self) {
        self.join.store(true, Ordering::Release);
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("resource thread panicked");
            }
        }
    }
}

impl<C: 'static> Drop for RenderServer<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn server() -> RenderServer<Vec<u32>> {
        RenderServer::start(&RenderConfig::default(), Vec::new).unwrap()
    }

    #[test]
    fn task_result_is_delivered() {
        let server = server();
        let mut future = server.spawn_resource_task(|_: &mut Vec<u32>| Ok(21 * 2));
        assert!(future.valid());
        assert_eq!(future.get().unwrap(), 42);
        assert!(!future.valid());
    }

    #[test]
    fn task_error_is_rethrown() {
        let server = server();
        let mut future =
            server.spawn_resource_task(|_: &mut Vec<u32>| -> RenderResult<()> { Err(RenderError::TaskFailed("x".into())) });
        let err = future.get().unwrap_err();
        assert_eq!(err.to_string(), "x");
        assert!(!future.valid());
        assert_eq!(future.get().unwrap_err(), RenderError::FutureInvalid);
    }

    #[test]
    fn panicking_task_is_reported() {
        let server = server();
        let mut future = server.spawn_resource_task(|_: &mut Vec<u32>| -> RenderResult<()> { panic!("x") });
        assert_eq!(future.get().unwrap_err(), RenderError::TaskPanicked("x".into()));

        let mut next = server.spawn_resource_task(|_: &mut Vec<u32>| Ok(1));
        assert_eq!(next.get().unwrap(), 1);
    }

    #[test]
    fn tasks_run_in_submission_order() {
        let server = server();
        let futures: Vec<_> = (0..100)
            .map(|i| {
                server.spawn_resource_task(move |log: &mut Vec<u32>| {
                    log.push(i);
                    Ok(())
                })
            })
            .collect();
        let mut last = server.spawn_resource_task(|log: &mut Vec<u32>| Ok(log.clone()));
        assert_eq!(last.get().unwrap(), (0..100).collect::<Vec<_>>());
        assert!(futures.iter().all(Future::is_ready));
    }

    #[test]
    fn shutdown_drains_queue() {
        let mut server = server();
        let mut slow = server.spawn_resource_task(|_: &mut Vec<u32>| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(1)
        });
        let mut queued = server.spawn_resource_task(|_: &mut Vec<u32>| Ok(2));
        server.shutdown();
        assert!(!server.is_running());
        assert_eq!(slow.get().unwrap(), 1);
        assert_eq!(queued.get().unwrap(), 2);

        let mut late = server.spawn_resource_task(|_: &mut Vec<u32>| Ok(3));
        assert_eq!(late.get().unwrap_err(), RenderError::ServerShutdown);
    }

    #[test]
    fn wait_blocks_until_ready() {
        let server = server();
        let future = server.spawn_resource_task(|_: &mut Vec<u32>| {
            std::thread::sleep(Duration::from_millis(10));
            Ok(())
        });
        future.wait();
        assert!(future.is_ready());
        assert!(future.valid());
    }

    #[test]
    fn futures_can_be_awaited_from_other_threads() {
        let server = Arc::new(server());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let server = server.clone();
                std::thread::spawn(move || {
                    let mut future = server.spawn_resource_task(move |_: &mut Vec<u32>| Ok(i * 10));
                    future.get().unwrap()
                })
            })
            .collect();
        let mut results: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort();
        assert_eq!(results, vec![0, 10, 20, 30]);
    }
}
