//! 단일 워커 작업 큐.
//!
//! 모든 게시 작업은 하나의 tokio 태스크에서 실행된다. 실행 순서는
//! (실행 가능 시각, 게시 순번) 오름차순이다. 이름 붙은 지연 작업은
//! 실행 전까지 레지스트리에 남아 `has()`/`cancel()`로 추적된다.

use ondemand_core::ports::reporter::Task;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// 워커에 전달하는 명령
enum Command {
    Submit(ScheduledTask),
    Cancel(u64),
}

/// 예약된 작업
struct ScheduledTask {
    due: Instant,
    seq: u64,
    name: Option<String>,
    task: Task,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    // BinaryHeap은 최대 힙이므로 역순으로 비교해 가장 이른 작업이 위로 오게 한다
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

type NameRegistry = Arc<Mutex<HashMap<String, u64>>>;

struct QueueInner {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    seq: AtomicU64,
    named: NameRegistry,
    /// 종료 후 채널에 남은 작업을 워커가 버리도록 알린다
    closed: Arc<AtomicBool>,
}

/// 단일 워커 작업 큐 (복제 시 같은 워커를 공유)
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.inner.name)
            .field("available", &self.is_available())
            .finish()
    }
}

impl TaskQueue {
    /// 새 작업 큐 생성
    ///
    /// 현재 tokio 런타임에 워커를 띄운다. 런타임이 없으면 미초기화 상태로
    /// 만들어지며 모든 게시가 즉시 false를 반환한다.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let named: NameRegistry = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let tx = match Handle::try_current() {
            Ok(handle) => {
                let (tx, rx) = mpsc::unbounded_channel();
                handle.spawn(run_worker(name.clone(), rx, named.clone(), closed.clone()));
                debug!("작업 큐 시작: {name}");
                Some(tx)
            }
            Err(e) => {
                warn!("tokio 런타임 없음, 작업 큐 미초기화: {name}: {e}");
                None
            }
        };

        Self {
            inner: Arc::new(QueueInner {
                name,
                tx: Mutex::new(tx),
                seq: AtomicU64::new(0),
                named,
                closed,
            }),
        }
    }

    /// 큐 이름
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 워커가 살아 있어 게시를 받을 수 있는지
    pub fn is_available(&self) -> bool {
        self.inner
            .tx
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// 즉시 실행 작업 게시
    pub fn post(&self, task: Task) -> bool {
        self.submit(task, None, Duration::ZERO).is_some()
    }

    /// 지연 작업 게시
    pub fn post_delayed(&self, task: Task, delay: Duration) -> bool {
        self.submit(task, None, delay).is_some()
    }

    /// 이름 붙은 지연 작업 게시
    ///
    /// 같은 이름이 이미 대기 중이어도 먼저 취소하지 않는다. 두 작업 모두 실행되며
    /// 레지스트리는 나중 작업만 가리킨다. 교체가 필요하면 `cancel()`을 먼저 호출한다.
    pub fn post_named_delayed(&self, task: Task, name: &str, delay: Duration) -> bool {
        // 워커가 먼저 실행해 버려도 레지스트리가 남지 않도록 제출 전에 등록한다
        let seq = self.next_seq();
        let previous = self.inner.named.lock().insert(name.to_string(), seq);
        if previous.is_some() {
            debug!("{}: 같은 이름의 대기 작업 존재, 교체하지 않음: {name}", self.inner.name);
        }

        if self
            .submit_with_seq(task, Some(name.to_string()), delay, seq)
            .is_some()
        {
            return true;
        }

        let mut named = self.inner.named.lock();
        if named.get(name) == Some(&seq) {
            match previous {
                Some(prev) => named.insert(name.to_string(), prev),
                None => named.remove(name),
            };
        }
        false
    }

    /// 이름 붙은 대기 작업 취소
    ///
    /// 레지스트리에서는 항상 제거한다. 모르는 이름이면 경고만 남기고 false.
    pub fn cancel(&self, name: &str) -> bool {
        let Some(seq) = self.inner.named.lock().remove(name) else {
            warn!("{}: 취소할 작업 없음: {name}", self.inner.name);
            return false;
        };
        let sent = self
            .sender()
            .is_some_and(|tx| tx.send(Command::Cancel(seq)).is_ok());
        if !sent {
            warn!("{}: 워커 종료됨, 취소 전달 실패: {name}", self.inner.name);
        }
        sent
    }

    /// 이름 붙은 작업이 아직 대기 중인지
    pub fn has(&self, name: &str) -> bool {
        self.inner.named.lock().contains_key(name)
    }

    /// 큐 종료: 이후 모든 게시는 false. 대기 작업은 실행되지 않는다
    ///
    /// 채널에 이미 들어간 작업도 버려진다.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, AtomicOrdering::SeqCst);
        if self.inner.tx.lock().take().is_some() {
            self.inner.named.lock().clear();
            debug!("작업 큐 종료: {}", self.inner.name);
        }
    }

    fn next_seq(&self) -> u64 {
        self.inner.seq.fetch_add(1, AtomicOrdering::Relaxed)
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Command>> {
        self.inner.tx.lock().clone()
    }

    fn submit(&self, task: Task, name: Option<String>, delay: Duration) -> Option<u64> {
        let seq = self.next_seq();
        self.submit_with_seq(task, name, delay, seq)
    }

    fn submit_with_seq(
        &self,
        task: Task,
        name: Option<String>,
        delay: Duration,
        seq: u64,
    ) -> Option<u64> {
        let Some(tx) = self.sender() else {
            warn!("{}: 작업 큐 미초기화, 게시 거부", self.inner.name);
            return None;
        };
        let Some(due) = Instant::now().checked_add(delay) else {
            warn!("{}: 지연 시간 범위 초과: {delay:?}", self.inner.name);
            return None;
        };

        let scheduled = ScheduledTask {
            due,
            seq,
            name,
            task,
        };
        match tx.send(Command::Submit(scheduled)) {
            Ok(()) => Some(seq),
            Err(_) => {
                warn!("{}: 워커 종료됨, 게시 실패", self.inner.name);
                None
            }
        }
    }
}

/// 워커 루프: 채널이 닫히면 종료
async fn run_worker(
    queue_name: String,
    mut rx: mpsc::UnboundedReceiver<Command>,
    named: NameRegistry,
    closed: Arc<AtomicBool>,
) {
    let mut heap: BinaryHeap<ScheduledTask> = BinaryHeap::new();
    let mut cancelled: HashSet<u64> = HashSet::new();

    loop {
        if closed.load(AtomicOrdering::SeqCst) {
            break;
        }
        let now = Instant::now();
        while heap.peek().is_some_and(|top| top.due <= now) {
            let Some(scheduled) = heap.pop() else { break };
            if cancelled.remove(&scheduled.seq) {
                debug!("{queue_name}: 취소된 작업 건너뜀 seq={}", scheduled.seq);
                continue;
            }
            if closed.load(AtomicOrdering::SeqCst) {
                heap.push(scheduled);
                break;
            }
            execute(&queue_name, scheduled, &named);
        }

        let next_due = heap.peek().map(|top| top.due);
        let deadline = next_due.unwrap_or(now);

        tokio::select! {
            biased;
            command = rx.recv() => match command {
                Some(Command::Submit(scheduled)) => heap.push(scheduled),
                Some(Command::Cancel(seq)) => {
                    if heap.iter().any(|t| t.seq == seq) {
                        cancelled.insert(seq);
                    }
                }
                None => break,
            },
            _ = tokio::time::sleep_until(deadline), if next_due.is_some() => {}
        }
    }

    debug!("작업 큐 워커 종료: {queue_name} (미실행 {}건)", heap.len());
}

fn execute(queue_name: &str, scheduled: ScheduledTask, named: &NameRegistry) {
    let ScheduledTask { seq, name, task, .. } = scheduled;

    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("{queue_name}: 작업 실행 중 panic seq={seq}");
    }

    if let Some(name) = name {
        let mut registry = named.lock();
        if registry.get(&name) == Some(&seq) {
            registry.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        let make = move |label: &'static str| -> Task {
            let log = log2.clone();
            Box::new(move || log.lock().push(label))
        };
        (log, make)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_in_eligibility_order() {
        let queue = TaskQueue::new("order");
        let (log, task) = recorder();

        assert!(queue.post_delayed(task("late"), Duration::from_millis(50)));
        assert!(queue.post_delayed(task("early"), Duration::from_millis(10)));
        assert!(queue.post(task("now-1")));
        assert!(queue.post(task("now-2")));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*log.lock(), vec!["now-1", "now-2", "early", "late"]);
    }

    #[tokio::test(start_paused = true)]
    async fn named_task_leaves_registry_after_run() {
        let queue = TaskQueue::new("named");
        let (log, task) = recorder();

        assert!(queue.post_named_delayed(task("a"), "evict", Duration::from_millis(20)));
        assert!(queue.has("evict"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!queue.has("evict"));
        assert_eq!(*log.lock(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_pending_task() {
        let queue = TaskQueue::new("cancel");
        let (log, task) = recorder();

        assert!(queue.post_named_delayed(task("a"), "job", Duration::from_millis(20)));
        assert!(queue.cancel("job"));
        assert!(!queue.has("job"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_unknown_name_is_reported_noop() {
        let queue = TaskQueue::new("unknown");
        assert!(!queue.cancel("missing"));
        assert!(queue.post(Box::new(|| {})));
    }

    #[tokio::test(start_paused = true)]
    async fn repost_same_name_keeps_both_tasks() {
        let queue = TaskQueue::new("repost");
        let (log, task) = recorder();

        assert!(queue.post_named_delayed(task("first"), "dup", Duration::from_millis(20)));
        assert!(queue.post_named_delayed(task("second"), "dup", Duration::from_millis(40)));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(*log.lock(), vec!["first"]);
        // 첫 작업 실행이 나중 작업의 등록을 지우지 않는다
        assert!(queue.has("dup"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*log.lock(), vec!["first", "second"]);
        assert!(!queue.has("dup"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_repost_only_stops_latest() {
        let queue = TaskQueue::new("repost-cancel");
        let (log, task) = recorder();

        queue.post_named_delayed(task("first"), "dup", Duration::from_millis(20));
        queue.post_named_delayed(task("second"), "dup", Duration::from_millis(20));
        assert!(queue.cancel("dup"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(*log.lock(), vec!["first"]);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_task_does_not_kill_worker() {
        let queue = TaskQueue::new("panic");
        let counter = Arc::new(AtomicUsize::new(0));

        queue.post(Box::new(|| panic!("boom")));
        let c = counter.clone();
        queue.post(Box::new(move || {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
        assert!(queue.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_rejects_posts() {
        let queue = TaskQueue::new("shutdown");
        let (log, task) = recorder();

        queue.post_named_delayed(task("pending"), "p", Duration::from_millis(10));
        queue.shutdown();

        assert!(!queue.is_available());
        assert!(!queue.post(task("after")));
        assert!(!queue.post_named_delayed(task("after"), "x", Duration::ZERO));
        assert!(!queue.has("p"));
        assert!(!queue.has("x"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_tasks_already_in_channel() {
        let queue = TaskQueue::new("buffered");
        let (log, task) = recorder();

        // 워커가 한 번도 돌기 전에 게시와 종료가 모두 끝난다
        assert!(queue.post(task("a")));
        assert!(queue.post(task("b")));
        queue.shutdown();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(log.lock().is_empty());
    }

    #[test]
    fn without_runtime_posts_fail_fast() {
        let queue = TaskQueue::new("no-runtime");
        assert!(!queue.is_available());
        assert!(!queue.post(Box::new(|| {})));
        assert!(!queue.post_delayed(Box::new(|| {}), Duration::from_secs(1)));
        assert!(!queue.post_named_delayed(Box::new(|| {}), "n", Duration::ZERO));
        assert!(!queue.has("n"));
    }

    #[tokio::test(start_paused = true)]
    async fn overflowing_delay_is_rejected() {
        let queue = TaskQueue::new("overflow");
        assert!(!queue.post_delayed(Box::new(|| {}), Duration::MAX));
    }
}
