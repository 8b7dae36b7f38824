use core::{
    num::NonZeroU32,
    sync::atomic::{AtomicI64, AtomicU32, Ordering},
    time::Duration,
};
use std::collections::HashSet;

use bytes::Bytes;
use loadgen::{CallError, CallResult, Caller, Generator, ParamSet, RawReq, RawResp, RetCode, Status};
use tokio::sync::mpsc::{self, error::TryRecvError, Receiver};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Responds successfully after the given delay.
    Respond(Duration),
    /// Fails at transport level after the given delay.
    Fail(Duration),
    /// Odd requests respond immediately, even ones exceed any sane timeout.
    Alternate,
    BuildErr,
    PanicBuild,
    PanicCall,
}

#[derive(Debug)]
struct Scripted {
    behavior: Behavior,
    next_id: AtomicI64,
    in_flight: AtomicU32,
    peak: AtomicU32,
}

impl Scripted {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            next_id: AtomicI64::new(1),
            in_flight: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        }
    }
}

impl Caller for Scripted {
    fn build_req(&self) -> Result<RawReq, CallError> {
        match self.behavior {
            Behavior::BuildErr => Err(CallError::Other("no payload".into())),
            Behavior::PanicBuild => panic!("build failed"),
            _ => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                Ok(RawReq { id, req: Bytes::from(id.to_string()) })
            }
        }
    }

    async fn call(&self, req: Bytes, _timeout: Duration) -> Result<Bytes, CallError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let result = match self.behavior {
            Behavior::Respond(delay) => {
                tokio::time::sleep(delay).await;
                Ok(req)
            }
            Behavior::Fail(delay) => {
                tokio::time::sleep(delay).await;
                Err(CallError::Other("connection refused".into()))
            }
            Behavior::Alternate => {
                let id: i64 = String::from_utf8_lossy(&req).parse().unwrap_or(0);
                if id % 2 == 0 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                } else {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Ok(req)
            }
            Behavior::PanicCall => panic!("call failed"),
            Behavior::BuildErr | Behavior::PanicBuild => unreachable!(),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn check_resp(&self, req: &RawReq, resp: &RawResp) -> CallResult {
        if resp.resp != req.req {
            return CallResult::new(req, RetCode::ErrorResponse, "mismatched payload");
        }

        CallResult::new(req, RetCode::Success, "ok").with_resp(resp.clone())
    }
}

struct Setup {
    behavior: Behavior,
    timeout: Duration,
    lps: u32,
    duration: Duration,
    concurrency: Option<u32>,
    buffer: usize,
}

impl Setup {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            timeout: Duration::from_millis(50),
            lps: 100,
            duration: Duration::from_millis(100),
            concurrency: None,
            buffer: 1000,
        }
    }

    fn build(self) -> (Generator<Scripted>, Receiver<CallResult>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let pset = ParamSet {
            caller: Scripted::new(self.behavior),
            timeout: self.timeout,
            lps: self.lps,
            duration: self.duration,
            concurrency: self.concurrency.and_then(NonZeroU32::new),
            result_tx: tx,
        };

        (Generator::new(pset).unwrap(), rx)
    }
}

async fn drain(mut rx: Receiver<CallResult>) -> Vec<CallResult> {
    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }

    results
}

#[tokio::test(start_paused = true)]
async fn illegal_transitions_are_rejected() {
    let (gen, rx) = Setup::new(Behavior::Respond(Duration::from_millis(1))).build();
    assert_eq!(Status::Original, gen.status());

    assert!(!gen.stop().await);
    assert_eq!(Status::Original, gen.status());

    assert!(gen.start());
    assert_eq!(Status::Started, gen.status());
    assert!(!gen.start());
    assert_eq!(Status::Started, gen.status());

    drain(rx).await;
    assert_eq!(Status::Stopped, gen.status());
    assert!(!gen.stop().await);
    assert_eq!(Status::Stopped, gen.status());
}

#[tokio::test(start_paused = true)]
async fn run_ends_when_duration_elapses() {
    let (gen, rx) = Setup::new(Behavior::Respond(Duration::from_millis(1))).build();
    assert_eq!(6, gen.concurrency());
    assert!(gen.start());

    let results = drain(rx).await;

    assert_eq!(Status::Stopped, gen.status());
    assert!(!results.is_empty());
    assert!(results.len() as i64 <= gen.call_count());
    for result in &results {
        assert_eq!(RetCode::Success, result.code, "{result:?}");
        assert!(result.elapsed >= Duration::from_millis(1), "{result:?}");
        assert!(result.elapsed < Duration::from_millis(50), "{result:?}");
        assert_eq!(Some(result.id), result.req.as_ref().map(|req| req.id));
    }
}

#[tokio::test(start_paused = true)]
async fn slow_calls_are_reported_as_timeouts() {
    let mut setup = Setup::new(Behavior::Respond(Duration::from_millis(200)));
    setup.lps = 10;
    setup.duration = Duration::from_secs(1);
    let (gen, rx) = setup.build();
    assert_eq!(1, gen.concurrency());
    assert!(gen.start());

    let results = drain(rx).await;

    assert!(!results.is_empty());
    assert!(results.len() as i64 <= gen.call_count());
    for result in &results {
        assert_eq!(RetCode::WarningCallTimeout, result.code, "{result:?}");
        assert_eq!(Duration::from_millis(50), result.elapsed);
    }
}

#[tokio::test(start_paused = true)]
async fn each_call_yields_at_most_one_result() {
    let mut setup = Setup::new(Behavior::Alternate);
    setup.lps = 10;
    setup.duration = Duration::from_secs(1);
    let (gen, rx) = setup.build();
    assert!(gen.start());

    let results = drain(rx).await;

    let ids: HashSet<i64> = results.iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), results.len());
    assert_eq!(gen.call_count(), results.len() as i64);
    for result in &results {
        let expected = if result.id % 2 == 0 {
            RetCode::WarningCallTimeout
        } else {
            RetCode::Success
        };
        assert_eq!(expected, result.code, "{result:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn transport_errors_are_reported() {
    let (gen, rx) = Setup::new(Behavior::Fail(Duration::from_millis(1))).build();
    assert!(gen.start());

    let results = drain(rx).await;

    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(RetCode::ErrorCall, result.code);
        assert!(result.msg.contains("Sync call error"), "{}", result.msg);
        assert!(result.msg.contains("connection refused"), "{}", result.msg);
    }
}

#[tokio::test(start_paused = true)]
async fn build_errors_are_fatal() {
    let (gen, rx) = Setup::new(Behavior::BuildErr).build();
    assert!(gen.start());

    let results = drain(rx).await;

    assert!(!results.is_empty());
    assert!(results.len() as i64 <= gen.call_count());
    for result in &results {
        assert_eq!(-1, result.id);
        assert_eq!(RetCode::FatalCall, result.code);
        assert!(result.msg.starts_with("invalid raw request"), "{}", result.msg);
    }
}

#[tokio::test(start_paused = true)]
async fn panics_are_contained() {
    let (gen, rx) = Setup::new(Behavior::PanicBuild).build();
    assert!(gen.start());

    let results = drain(rx).await;

    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(-1, result.id);
        assert_eq!(RetCode::FatalCall, result.code);
        assert!(result.msg.contains("Async Call Panic!"), "{}", result.msg);
        assert!(result.msg.contains("build failed"), "{}", result.msg);
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(gen.tickets().total(), gen.tickets().remainder());
}

#[tokio::test(start_paused = true)]
async fn panicking_call_disarms_timer() {
    let (gen, rx) = Setup::new(Behavior::PanicCall).build();
    assert!(gen.start());

    let results = drain(rx).await;

    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.code == RetCode::FatalCall));
}

#[tokio::test(start_paused = true)]
async fn full_channel_drops_results() {
    let mut setup = Setup::new(Behavior::Respond(Duration::from_millis(1)));
    setup.buffer = 1;
    let (gen, rx) = setup.build();
    assert!(gen.start());

    while gen.status() != Status::Stopped {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let results = drain(rx).await;

    assert_eq!(1, results.len());
    assert!(gen.call_count() > 1);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(gen.tickets().total(), gen.tickets().remainder());
}

#[tokio::test(start_paused = true)]
async fn stop_waits_until_stopped() {
    let mut setup = Setup::new(Behavior::Respond(Duration::from_millis(1)));
    setup.duration = Duration::from_secs(60);
    let (gen, rx) = setup.build();
    assert!(gen.start());

    tokio::time::sleep(Duration::from_millis(55)).await;
    assert!(gen.stop().await);
    assert_eq!(Status::Stopped, gen.status());

    let results = drain(rx).await;
    assert!(gen.call_count() > 0);
    assert!(results.len() as i64 <= gen.call_count());
}

#[tokio::test(start_paused = true)]
async fn stop_is_observed_while_tickets_are_exhausted() {
    let mut setup = Setup::new(Behavior::Respond(Duration::from_secs(10)));
    setup.lps = 10;
    setup.duration = Duration::from_secs(60);
    let (gen, rx) = setup.build();
    assert_eq!(1, gen.concurrency());
    assert!(gen.start());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(0, gen.tickets().remainder());
    assert!(gen.stop().await);

    let results = drain(rx).await;
    assert_eq!(1, gen.call_count());
    assert_eq!(1, results.len());
    assert_eq!(RetCode::WarningCallTimeout, results[0].code);
}

#[tokio::test(start_paused = true)]
async fn unthrottled_run_is_bounded_by_concurrency() {
    let mut setup = Setup::new(Behavior::Respond(Duration::from_millis(10)));
    setup.lps = 0;
    setup.concurrency = Some(4);
    let (gen, rx) = setup.build();
    assert_eq!(4, gen.concurrency());
    assert!(gen.start());

    let results = drain(rx).await;

    assert!(results.len() >= 4);
    let peak = gen.caller().peak.load(Ordering::SeqCst);
    assert!(peak > 0 && peak <= 4, "{peak}");
}

#[tokio::test(start_paused = true)]
async fn restart_resets_call_count() {
    let (gen, rx) = Setup::new(Behavior::Respond(Duration::from_millis(1))).build();
    assert!(gen.start());
    drain(rx).await;
    assert_eq!(Status::Stopped, gen.status());
    assert!(gen.call_count() > 0);

    let (tx, rx) = mpsc::channel(1000);
    assert!(gen.reattach(tx));
    assert!(gen.start());
    assert_eq!(0, gen.call_count());
    assert_eq!(Status::Started, gen.status());

    let results = drain(rx).await;
    assert_eq!(Status::Stopped, gen.status());
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.code == RetCode::Success));
}

#[tokio::test(start_paused = true)]
async fn restart_without_new_channel_drops_results() {
    let (gen, mut rx) = Setup::new(Behavior::Respond(Duration::from_millis(1))).build();
    assert!(gen.start());
    let mut first = 0;
    while rx.recv().await.is_some() {
        first += 1;
    }
    assert!(first > 0);

    assert!(gen.start());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(Status::Stopped, gen.status());
    assert!(gen.call_count() > 0);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));

    // A reattached channel receives the next run again.
    let (tx, rx) = mpsc::channel(1000);
    assert!(gen.reattach(tx));
    assert!(gen.start());
    let results = drain(rx).await;

    assert!(!results.is_empty());
    assert!(results.len() as i64 <= gen.call_count());
}
