use std::{
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::watch,
    time::Instant,
};
use tracing::{
    debug,
    warn,
};

const BOARD_CAPACITY: usize = 20;
/// Success notices fade after this long; loading and error notices stay until replaced.
pub const SUCCESS_TTL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NoticeHandle(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Loading,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn loading(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Loading,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Receives user-visible status updates.
pub trait NotificationSink: Send + Sync {
    /// Post a notice; later updates through the returned handle replace it.
    fn open(&self, notice: Notice) -> NoticeHandle;

    fn set(&self, handle: NoticeHandle, notice: Notice);

    fn error(&self, message: String) {
        let _ = self.open(Notice::error(message));
    }

    fn dismiss(&self, handle: NoticeHandle);
}

/// In-memory notices rendered by the terminal UI.
#[derive(Clone)]
pub struct NotificationBoard {
    state: Arc<Mutex<BoardState>>,
    version: Arc<watch::Sender<u64>>,
}

#[derive(Default)]
struct BoardState {
    next_handle: u64,
    entries: Vec<BoardEntry>,
}

impl BoardState {
    /// Oldest entries are evicted past capacity.
    fn push(&mut self, handle: NoticeHandle, notice: Notice) {
        self.entries.push(BoardEntry {
            handle,
            notice,
            posted_at: Instant::now(),
        });
        if self.entries.len() > BOARD_CAPACITY {
            let drain = self.entries.len() - BOARD_CAPACITY;
            self.entries.drain(0..drain);
        }
    }
}

struct BoardEntry {
    handle: NoticeHandle,
    notice: Notice,
    posted_at: Instant,
}

impl Default for NotificationBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBoard {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(BoardState::default())),
            version: Arc::new(version),
        }
    }

    /// Ticks whenever a notice is posted, replaced or dismissed.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Visible notices, newest first.
    pub fn notices(&self) -> Vec<Notice> {
        let now = Instant::now();
        let state = self.lock();
        state
            .entries
            .iter()
            .rev()
            .filter(|entry| {
                entry.notice.level != NoticeLevel::Success
                    || now.duration_since(entry.posted_at) < SUCCESS_TTL
            })
            .map(|entry| entry.notice.clone())
            .collect()
    }

    pub fn get(&self, handle: NoticeHandle) -> Option<Notice> {
        self.lock()
            .entries
            .iter()
            .find(|entry| entry.handle == handle)
            .map(|entry| entry.notice.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

impl NotificationSink for NotificationBoard {
    fn open(&self, notice: Notice) -> NoticeHandle {
        log_notice(&notice);
        let handle = {
            let mut state = self.lock();
            let handle = NoticeHandle(state.next_handle);
            state.next_handle += 1;
            state.push(handle, notice);
            handle
        };
        self.bump();
        handle
    }

    fn set(&self, handle: NoticeHandle, notice: Notice) {
        log_notice(&notice);
        {
            let mut state = self.lock();
            match state.entries.iter_mut().find(|entry| entry.handle == handle) {
                Some(entry) => {
                    entry.notice = notice;
                    entry.posted_at = Instant::now();
                }
                // evicted or dismissed; show it again under the same handle
                None => state.push(handle, notice),
            }
        }
        self.bump();
    }

    fn dismiss(&self, handle: NoticeHandle) {
        self.lock().entries.retain(|entry| entry.handle != handle);
        self.bump();
    }
}

fn log_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Error => warn!(message = %notice.message, "notice"),
        _ => debug!(message = %notice.message, "notice"),
    }
}
