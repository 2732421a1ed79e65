//! Per-buffer event multiplexer.
//!
//! Each buffer gets one listener task that folds incoming events into an
//! [`EventMask`] and runs its [`DebounceTarget`] once the debounce window
//! closes. Timers use tokio's monotonic clock.

use crate::host::BufferId;
use log::{debug, trace};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Load,
    Modified,
    PostSave,
    Activated,
    Clone,
    /// The working tree's compare target was switched.
    TargetChanged,
}

impl EventKind {
    fn bit(self) -> u8 {
        match self {
            EventKind::Load => 1,
            EventKind::Modified => 1 << 1,
            EventKind::PostSave => 1 << 2,
            EventKind::Activated => 1 << 3,
            EventKind::Clone => 1 << 4,
            EventKind::TargetChanged => 1 << 5,
        }
    }
}

/// Set of event kinds received during one debounce window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventMask(u8);

impl EventMask {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, kind: EventKind) {
        self.0 |= kind.bit();
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<EventKind> for EventMask {
    fn from(kind: EventKind) -> Self {
        Self(kind.bit())
    }
}

impl<const N: usize> From<[EventKind; N]> for EventMask {
    fn from(kinds: [EventKind; N]) -> Self {
        let mut mask = Self::empty();
        for kind in kinds {
            mask.insert(kind);
        }
        mask
    }
}

/// What a listener drives.
pub trait DebounceTarget: Send + 'static {
    /// Whether an event of this kind should start or extend a window.
    fn admits(&mut self, kind: EventKind) -> bool;

    fn debounce_delay(&self) -> Duration;

    /// Runs are skipped for buffers that are not on screen.
    fn is_visible(&self) -> bool;

    fn run(&mut self, mask: EventMask) -> impl Future<Output = ()> + Send;
}

async fn listen<T: DebounceTarget>(
    buffer: BufferId,
    mut target: T,
    mut events: mpsc::UnboundedReceiver<EventKind>,
) {
    while let Some(kind) = events.recv().await {
        if !target.admits(kind) {
            trace!("Buffer {buffer}: ignoring {kind:?}");
            continue;
        }

        let mut mask = EventMask::from(kind);
        let delay = target.debounce_delay();
        let mut latest = Instant::now();
        let mut wait_started = latest;
        let mut deadline = wait_started + delay;

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    if latest > wait_started {
                        wait_started = Instant::now();
                        deadline = wait_started + delay;
                        continue;
                    }
                    break;
                }
                event = events.recv() => match event {
                    Some(kind) => {
                        if target.admits(kind) {
                            mask.insert(kind);
                            latest = Instant::now();
                        }
                    }
                    None => {
                        debug!("Buffer {buffer}: listener closed while debouncing");
                        return;
                    }
                },
            }
        }

        if target.is_visible() {
            trace!("Buffer {buffer}: running with {mask:?}");
            target.run(mask).await;
        } else {
            trace!("Buffer {buffer}: not visible, skipping run");
        }
    }
    debug!("Buffer {buffer}: listener stopped");
}

#[derive(Debug)]
struct Listener {
    events: mpsc::UnboundedSender<EventKind>,
    task: JoinHandle<()>,
}

/// Buffer id to listener map. Listeners hold no reference to the buffer
/// itself, so closed buffers are reclaimed by [`EventMux::collect_garbage`].
#[derive(Debug, Default)]
pub struct EventMux {
    listeners: scc::HashMap<BufferId, Listener>,
}

impl EventMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward `kind` to the buffer's listener, spawning one from `create`
    /// if needed. Must be called from within a tokio runtime.
    pub fn dispatch<T, F>(&self, buffer: BufferId, kind: EventKind, create: F)
    where
        T: DebounceTarget,
        F: FnOnce() -> T,
    {
        let delivered = self
            .listeners
            .read(&buffer, |_, listener| listener.events.send(kind).is_ok())
            .unwrap_or(false);
        if delivered {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(kind);
        let task = tokio::spawn(listen(buffer, create(), rx));
        debug!("Buffer {buffer}: listener started");
        self.listeners.upsert(buffer, Listener { events: tx, task });
    }

    /// Stop listening to `buffer`. A run in progress completes; a pending
    /// debounce window is dropped.
    pub fn remove(&self, buffer: BufferId) -> bool {
        self.listeners.remove(&buffer).is_some()
    }

    pub fn contains(&self, buffer: BufferId) -> bool {
        self.listeners.contains(&buffer)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn buffers(&self) -> Vec<BufferId> {
        let mut buffers = Vec::new();
        self.listeners.scan(|buffer, _| buffers.push(*buffer));
        buffers
    }

    /// Drop listeners whose buffer is gone or whose task has ended.
    pub fn collect_garbage(&self, alive: impl Fn(BufferId) -> bool) -> usize {
        let before = self.listeners.len();
        self.listeners
            .retain(|buffer, listener| alive(*buffer) && !listener.task.is_finished());
        let removed = before.saturating_sub(self.listeners.len());
        if removed > 0 {
            debug!("Collected {removed} listener(s)");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Clone)]
    struct Recorder {
        runs: Arc<Mutex<Vec<(Instant, EventMask)>>>,
        visible: Arc<AtomicBool>,
        live_mode: bool,
        delay: Duration,
    }

    impl Recorder {
        fn new(delay_ms: u64) -> Self {
            Self {
                runs: Arc::new(Mutex::new(Vec::new())),
                visible: Arc::new(AtomicBool::new(true)),
                live_mode: true,
                delay: Duration::from_millis(delay_ms),
            }
        }

        fn runs(&self) -> Vec<(Instant, EventMask)> {
            self.runs.lock().unwrap().clone()
        }
    }

    impl DebounceTarget for Recorder {
        fn admits(&mut self, kind: EventKind) -> bool {
            kind != EventKind::Modified || self.live_mode
        }

        fn debounce_delay(&self) -> Duration {
            self.delay
        }

        fn is_visible(&self) -> bool {
            self.visible.load(Ordering::SeqCst)
        }

        fn run(&mut self, mask: EventMask) -> impl Future<Output = ()> + Send {
            let runs = Arc::clone(&self.runs);
            async move {
                runs.lock().unwrap().push((Instant::now(), mask));
            }
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_event_mask() {
        let mut mask = EventMask::from(EventKind::Load);
        assert!(mask.contains(EventKind::Load));
        assert!(!mask.contains(EventKind::Modified));
        mask.insert(EventKind::Modified);
        assert!(mask.contains(EventKind::Modified));
        assert!(EventMask::empty().is_empty());
        assert_eq!(
            EventMask::from([EventKind::Load, EventKind::Modified]),
            mask
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once() {
        let mux = EventMux::new();
        let recorder = Recorder::new(1000);
        let start = Instant::now();

        mux.dispatch(1, EventKind::Load, || recorder.clone());
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            mux.dispatch(1, EventKind::Modified, || recorder.clone());
        }
        tokio::time::sleep(Duration::from_millis(5000)).await;
        settle().await;

        let runs = recorder.runs();
        assert_eq!(runs.len(), 1);
        let (at, mask) = runs[0];
        assert!(mask.contains(EventKind::Load));
        assert!(mask.contains(EventKind::Modified));
        // Events kept arriving during the first window, so a second one ran.
        let elapsed = at - start;
        assert!(elapsed >= Duration::from_millis(2000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_window_runs_after_delay() {
        let mux = EventMux::new();
        let recorder = Recorder::new(300);
        let start = Instant::now();

        mux.dispatch(1, EventKind::PostSave, || recorder.clone());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;

        let runs = recorder.runs();
        assert_eq!(runs.len(), 1);
        let elapsed = runs[0].0 - start;
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_run_separately() {
        let mux = EventMux::new();
        let recorder = Recorder::new(200);

        mux.dispatch(1, EventKind::Load, || recorder.clone());
        tokio::time::sleep(Duration::from_millis(500)).await;
        mux.dispatch(1, EventKind::Activated, || recorder.clone());
        tokio::time::sleep(Duration::from_millis(500)).await;
        settle().await;

        let runs = recorder.runs();
        assert_eq!(runs.len(), 2);
        assert!(runs[1].1.contains(EventKind::Activated));
        assert!(!runs[1].1.contains(EventKind::Load));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unadmitted_events_do_not_start_window() {
        let mux = EventMux::new();
        let mut recorder = Recorder::new(200);
        recorder.live_mode = false;

        mux.dispatch(1, EventKind::Modified, || recorder.clone());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert!(recorder.runs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invisible_buffer_skips_run() {
        let mux = EventMux::new();
        let recorder = Recorder::new(200);
        recorder.visible.store(false, Ordering::SeqCst);

        mux.dispatch(1, EventKind::Load, || recorder.clone());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert!(recorder.runs().is_empty());

        recorder.visible.store(true, Ordering::SeqCst);
        mux.dispatch(1, EventKind::Activated, || recorder.clone());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(recorder.runs().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_drops_pending_window() {
        let mux = EventMux::new();
        let recorder = Recorder::new(200);

        mux.dispatch(1, EventKind::Load, || recorder.clone());
        assert!(mux.contains(1));
        assert!(mux.remove(1));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert!(recorder.runs().is_empty());
        assert!(mux.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_garbage() {
        let mux = EventMux::new();
        let recorder = Recorder::new(200);
        for buffer in 1..=3 {
            mux.dispatch(buffer, EventKind::Load, || recorder.clone());
        }
        assert_eq!(mux.len(), 3);

        let removed = mux.collect_garbage(|buffer| buffer != 2);
        assert_eq!(removed, 1);
        let mut buffers = mux.buffers();
        buffers.sort();
        assert_eq!(buffers, vec![1, 3]);
    }
}
