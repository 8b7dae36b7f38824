use core::{
    any::Any,
    fmt::{self, Debug, Display, Formatter},
    sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering},
    time::Duration,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::{
    runtime::Handle,
    sync::{
        mpsc::{error::TrySendError, Sender},
        Notify,
    },
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

pub use self::param::ParamSet;
use crate::{
    caller::{CallResult, Caller, RawReq, RawResp, RetCode},
    error::{Error, ParamError, TicketsError},
    tickets::{Ticket, Tickets},
};

pub mod param;

/// Load generator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    Original = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
    Stopped = 4,
}

impl Status {
    #[inline]
    const fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Original,
            1 => Self::Starting,
            2 => Self::Started,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Why the dispatch loop has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    DeadlineExceeded,
    Canceled,
    /// The ticket pool refused admission.
    ///
    /// `Generator::new` always activates the pool, so a running dispatch
    /// loop never ends with this cause.
    Tickets(TicketsError),
}

impl Display for StopCause {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        match self {
            Self::DeadlineExceeded => fmt.write_str("deadline exceeded"),
            Self::Canceled => fmt.write_str("canceled"),
            Self::Tickets(err) => write!(fmt, "{err}"),
        }
    }
}

// Per-call state, arbitrating between the timeout timer and the call itself.
const CALL_PENDING: u8 = 0;
const CALL_COMPLETED: u8 = 1;
const CALL_TIMED_OUT: u8 = 2;

/// Load generator.
///
/// Issues calls against the given [`Caller`] with the configured rate,
/// bounding the number of in-flight calls, and streams the results into the
/// result channel without ever blocking on it.
pub struct Generator<C> {
    shared: Arc<Shared<C>>,
}

struct Shared<C> {
    caller: C,
    timeout: Duration,
    lps: u32,
    duration: Duration,
    concurrency: u32,
    tickets: Tickets,
    status: AtomicU32,
    call_count: AtomicI64,
    /// Number of runs started so far.
    runs: AtomicU64,
    /// The last run that reached the stopped state.
    stopped_run: AtomicU64,
    stopped: Notify,
    cancel: Mutex<CancellationToken>,
    /// Taken out (and thus closed) when a run finishes.
    result_tx: Mutex<Option<Sender<CallResult>>>,
    runtime: Handle,
}

impl<C> Generator<C>
where
    C: Caller,
{
    /// Constructs a new load generator.
    ///
    /// Must be called within a tokio runtime, which is then used to run
    /// the generator tasks.
    pub fn new(pset: ParamSet<C>) -> Result<Self, Error> {
        log::info!("creating a new load generator ...");
        pset.check()?;

        let runtime = Handle::try_current().map_err(|_| ParamError::NoRuntime)?;
        let concurrency = pset.concurrency()?;
        let tickets = Tickets::new(concurrency)?;
        log::info!("initialized the load generator (concurrency: {concurrency})");

        let ParamSet { caller, timeout, lps, duration, result_tx, .. } = pset;

        let shared = Shared {
            caller,
            timeout,
            lps,
            duration,
            concurrency,
            tickets,
            status: AtomicU32::new(Status::Original as u32),
            call_count: AtomicI64::new(0),
            runs: AtomicU64::new(0),
            stopped_run: AtomicU64::new(0),
            stopped: Notify::new(),
            cancel: Mutex::new(CancellationToken::new()),
            result_tx: Mutex::new(Some(result_tx)),
            runtime,
        };

        Ok(Self { shared: Arc::new(shared) })
    }

    /// Starts generating loads.
    ///
    /// Succeeds only from either the original or the stopped state and
    /// returns immediately, without waiting for the run to finish.
    pub fn start(&self) -> bool {
        let shared = &self.shared;
        log::info!("starting load generator ...");

        if !shared.transit(Status::Original, Status::Starting) && !shared.transit(Status::Stopped, Status::Starting) {
            return false;
        }

        if let Some(interval) = param::interval(shared.lps) {
            log::info!("setting throttle ({interval:?}) ...");
        }

        let token = CancellationToken::new();
        *lock(&shared.cancel) = token.clone();
        let deadline = Instant::now() + shared.duration;
        let run = shared.runs.fetch_add(1, Ordering::SeqCst) + 1;

        shared.call_count.store(0, Ordering::SeqCst);
        shared.status.store(Status::Started as u32, Ordering::SeqCst);

        let shared = self.shared.clone();
        self.shared.runtime.spawn(async move {
            log::info!("generating loads ...");
            let cause = shared.gen_load(token, deadline).await;
            shared.prepare_to_stop(run, cause);
            log::info!("stopped (call count: {})", shared.call_count());
        });

        true
    }

    /// Stops generating loads.
    ///
    /// Succeeds only from the started state, in which case it returns only
    /// after the generator has reached the stopped state.
    pub async fn stop(&self) -> bool {
        let shared = &self.shared;

        if !shared.transit(Status::Started, Status::Stopping) {
            return false;
        }

        let run = shared.runs.load(Ordering::SeqCst);
        lock(&shared.cancel).cancel();
        shared.wait_stopped(run).await;

        true
    }
}

impl<C> Generator<C> {
    #[inline]
    pub fn status(&self) -> Status {
        self.shared.status()
    }

    /// Returns the number of calls attempted during the current (or last)
    /// run.
    #[inline]
    pub fn call_count(&self) -> i64 {
        self.shared.call_count()
    }

    #[inline]
    pub fn concurrency(&self) -> u32 {
        self.shared.concurrency
    }

    #[inline]
    pub fn caller(&self) -> &C {
        &self.shared.caller
    }

    #[inline]
    pub fn tickets(&self) -> &Tickets {
        &self.shared.tickets
    }

    /// Replaces the result channel, e.g. before restarting.
    ///
    /// Allowed only while the generator is either in the original or the
    /// stopped state.
    pub fn reattach(&self, tx: Sender<CallResult>) -> bool {
        if tx.is_closed() {
            return false;
        }

        let mut result_tx = lock(&self.shared.result_tx);
        match self.status() {
            Status::Original | Status::Stopped => {
                *result_tx = Some(tx);
                true
            }
            _ => false,
        }
    }
}

impl<C> Debug for Generator<C> {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        fmt.debug_struct("Generator")
            .field("status", &self.status())
            .field("timeout", &self.shared.timeout)
            .field("lps", &self.shared.lps)
            .field("duration", &self.shared.duration)
            .field("concurrency", &self.shared.concurrency)
            .field("call_count", &self.call_count())
            .finish()
    }
}

impl<C> Shared<C> {
    #[inline]
    fn status(&self) -> Status {
        Status::from_u32(self.status.load(Ordering::SeqCst))
    }

    #[inline]
    fn call_count(&self) -> i64 {
        self.call_count.load(Ordering::SeqCst)
    }

    #[inline]
    fn transit(&self, from: Status, to: Status) -> bool {
        self.status
            .compare_exchange(from as u32, to as u32, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn wait_stopped(&self, run: u64) {
        loop {
            let notified = self.stopped.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.stopped_run.load(Ordering::SeqCst) >= run {
                return;
            }

            notified.await;
        }
    }

    /// Finalizes the given run.
    ///
    /// Closes the result channel, which signals the consumer that no more
    /// results will arrive.
    fn prepare_to_stop(&self, run: u64, cause: StopCause) {
        log::info!("preparing to stop load generator (cause: {cause}) ...");
        self.transit(Status::Started, Status::Stopping);

        log::info!("closing result channel ...");
        lock(&self.result_tx).take();

        self.status.store(Status::Stopped as u32, Ordering::SeqCst);
        self.stopped_run.store(run, Ordering::SeqCst);
        self.stopped.notify_waiters();
    }

    /// Delivers the result without blocking.
    ///
    /// Returns `false` if the result has been dropped, which is always
    /// logged together with the cause.
    fn send_result(&self, result: CallResult) -> bool {
        if self.status() != Status::Started {
            print_ignored_result(&result, "stopped load generator");
            return false;
        }

        let result_tx = lock(&self.result_tx);
        let Some(tx) = result_tx.as_ref() else {
            print_ignored_result(&result, "closed result channel");
            return false;
        };

        match tx.try_send(result) {
            Ok(()) => true,
            Err(TrySendError::Full(result)) => {
                print_ignored_result(&result, "full result channel");
                false
            }
            Err(TrySendError::Closed(result)) => {
                print_ignored_result(&result, "closed result channel");
                false
            }
        }
    }
}

impl<C> Shared<C>
where
    C: Caller,
{
    /// The dispatch loop.
    async fn gen_load(self: &Arc<Self>, token: CancellationToken, deadline: Instant) -> StopCause {
        let mut throttle = param::interval(self.lps).map(|interval| {
            let mut throttle = time::interval_at(Instant::now() + interval, interval);
            throttle.set_missed_tick_behavior(MissedTickBehavior::Skip);
            throttle
        });
        let expired = time::sleep_until(deadline);
        tokio::pin!(expired);

        loop {
            if token.is_cancelled() {
                return StopCause::Canceled;
            }
            if Instant::now() >= deadline {
                return StopCause::DeadlineExceeded;
            }

            // All tickets being held by in-flight calls stalls the admission
            // here.
            let ticket = tokio::select! {
                biased;
                _ = token.cancelled() => return StopCause::Canceled,
                _ = &mut expired => return StopCause::DeadlineExceeded,
                ticket = self.tickets.take() => ticket,
            };
            match ticket {
                Ok(ticket) => self.async_call(ticket),
                Err(err) => return StopCause::Tickets(err),
            }

            match &mut throttle {
                Some(throttle) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return StopCause::Canceled,
                        _ = &mut expired => return StopCause::DeadlineExceeded,
                        _ = throttle.tick() => {}
                    }
                }
                None => tokio::task::yield_now().await,
            }
        }
    }

    /// Spawns a single call, holding the given ticket until the call returns.
    fn async_call(self: &Arc<Self>, ticket: Ticket) {
        let shared = self.clone();

        self.runtime.spawn(async move {
            let state = Arc::new(AtomicU8::new(CALL_PENDING));
            let body = {
                let shared = shared.clone();
                let state = state.clone();
                let runtime = shared.runtime.clone();
                runtime.spawn(async move { shared.call_with_timeout(state).await })
            };

            if let Err(err) = body.await {
                let msg = match err.try_into_panic() {
                    Ok(panic) => format!("Async Call Panic! (clue: {})", panic_message(panic.as_ref())),
                    Err(err) => format!("Async Call Panic! (error: {err})"),
                };
                log::error!("{msg}");
                // Disarm the timer; a timeout result, if any, has already
                // been reported for this call.
                if state.swap(CALL_COMPLETED, Ordering::AcqRel) != CALL_TIMED_OUT {
                    shared.send_result(CallResult::fatal(msg));
                }
            }

            ticket.release();
        });
    }

    async fn call_with_timeout(self: Arc<Self>, state: Arc<AtomicU8>) {
        let req = match self.caller.build_req() {
            Ok(req) => req,
            Err(err) => {
                self.call_count.fetch_add(1, Ordering::SeqCst);
                self.send_result(CallResult::fatal(format!("invalid raw request: {err}")));
                return;
            }
        };

        let timer = {
            let shared = self.clone();
            let state = state.clone();
            let req = req.clone();

            self.runtime.spawn(async move {
                time::sleep(shared.timeout).await;
                if state
                    .compare_exchange(CALL_PENDING, CALL_TIMED_OUT, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return;
                }

                let mut result = CallResult::new(
                    &req,
                    RetCode::WarningCallTimeout,
                    format!("Timeout (expected: < {:?})", shared.timeout),
                );
                result.elapsed = shared.timeout;
                shared.send_result(result);
            })
        };

        let resp = self.call_one(&req).await;
        // The timer has won, so the response is abandoned.
        if state
            .compare_exchange(CALL_PENDING, CALL_COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        timer.abort();

        let result = match resp.err.clone() {
            Some(err) => {
                let mut result = CallResult::new(&req, RetCode::ErrorCall, err);
                result.elapsed = resp.elapsed;
                result.with_resp(resp)
            }
            None => {
                let mut result = self.caller.check_resp(&req, &resp);
                result.elapsed = resp.elapsed;
                result
            }
        };
        self.send_result(result);
    }

    /// Performs a single synchronous call, measuring its duration.
    async fn call_one(&self, req: &RawReq) -> RawResp {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let now = Instant::now();
        let resp = self.caller.call(req.req.clone(), self.timeout).await;
        let elapsed = now.elapsed();

        match resp {
            Ok(resp) => RawResp { id: req.id, resp, err: None, elapsed },
            Err(err) => RawResp {
                id: req.id,
                resp: Bytes::new(),
                err: Some(format!("Sync call error: {err}")),
                elapsed,
            },
        }
    }
}

fn print_ignored_result(result: &CallResult, cause: &str) {
    log::warn!(
        "ignored result: ID={}, Code={}, Msg={}, Elapse={:?} (cause: {cause})",
        result.id,
        result.code,
        result.msg,
        result.elapsed,
    );
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
