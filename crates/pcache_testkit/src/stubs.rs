//! Stub implementations of the remote collaborators.

use parking_lot::Mutex;
use pcache_core::{
    CacheError, CacheResult, MinifiedRecord, PatientFields, RemotePageFetcher, RemoteSearch,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

const PAUSE_TIMEOUT: Duration = Duration::from_secs(30);

struct PauseSignal {
    page: u32,
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

/// Test-side end of a paused fetch.
pub struct PauseHandle {
    entered: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
}

impl PauseHandle {
    /// Blocks until the fetcher is inside the paused page fetch.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(PAUSE_TIMEOUT)
            .expect("paused page was never fetched");
    }

    /// Lets the paused fetch return.
    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

/// A bulk endpoint serving a fixed list of page sizes.
///
/// Page `n` (1-based) holds `pages[n - 1]` generated records, capped at the
/// requested limit; pages past the end are empty. Every call is recorded.
pub struct PagedFetcher {
    pages: Vec<usize>,
    fail_at: Option<u32>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<(u32, u32)>>,
    pause: Mutex<Option<PauseSignal>>,
}

impl PagedFetcher {
    /// Creates a fetcher serving pages of the given sizes.
    pub fn with_pages(pages: impl IntoIterator<Item = usize>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
            fail_at: None,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            pause: Mutex::new(None),
        }
    }

    /// Fails the fetch of `page` with a 503 remote error.
    pub fn failing_at(mut self, page: u32) -> Self {
        self.fail_at = Some(page);
        self
    }

    /// Sleeps for `delay` inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes the next fetch of `page` block until released.
    pub fn pause_at(&self, page: u32) -> PauseHandle {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.pause.lock() = Some(PauseSignal {
            page,
            entered: entered_tx,
            release: release_rx,
        });
        PauseHandle {
            entered: entered_rx,
            release: release_tx,
        }
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that were ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every `(page, limit)` requested, in order.
    pub fn requests(&self) -> Vec<(u32, u32)> {
        self.requests.lock().clone()
    }

    /// Total records the fetcher can serve.
    pub fn total_records(&self) -> usize {
        self.pages.iter().sum()
    }

    fn page(&self, page: u32, limit: u32) -> Vec<MinifiedRecord> {
        let size = page
            .checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .copied()
            .unwrap_or(0)
            .min(limit as usize);
        (0..size).map(|i| remote_record(page, i)).collect()
    }
}

impl RemotePageFetcher for PagedFetcher {
    fn fetch_page(&self, page: u32, limit: u32) -> CacheResult<Vec<MinifiedRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.requests.lock().push((page, limit));

        let pause = {
            let mut slot = self.pause.lock();
            if slot.as_ref().is_some_and(|p| p.page == page) {
                slot.take()
            } else {
                None
            }
        };
        if let Some(signal) = pause {
            let _ = signal.entered.send(());
            let _ = signal.release.recv_timeout(PAUSE_TIMEOUT);
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let result = if self.fail_at == Some(page) {
            Err(CacheError::remote_status(
                format!("bulk fetch of page {page} failed"),
                503,
            ))
        } else {
            Ok(self.page(page, limit))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// The generated record at position `i` of `page`.
pub fn remote_record(page: u32, i: usize) -> MinifiedRecord {
    MinifiedRecord {
        uid: format!("p{page:04}-{i:05}"),
        fln: Some(format!("Patient {page}-{i}")),
        mobile: Some(format!("98{page:03}{i:05}")),
        username: Some(format!("user{page}_{i}")),
        dob: Some("1990-01-01".to_string()),
        gender: Some(if i % 2 == 0 { "F" } else { "M" }.to_string()),
        is_age: Some(false),
        health_id: Some(format!("HID-{page}-{i}")),
    }
}

/// Builds a remote search result.
pub fn remote_patient(uid: &str, fln: &str, mobile: &str) -> PatientFields {
    PatientFields {
        uid: Some(uid.to_string()),
        fln: Some(fln.to_string()),
        mobile: Some(mobile.to_string()),
        ..PatientFields::default()
    }
}

/// One recorded call to [`RecordingSearch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCall {
    /// Prefix searched for.
    pub prefix: String,
    /// Requested limit.
    pub limit: usize,
    /// Requested field selection.
    pub fields: Option<Vec<String>>,
}

/// A remote search returning canned results and recording every call.
#[derive(Default)]
pub struct RecordingSearch {
    results: Vec<PatientFields>,
    fail_status: Option<u16>,
    calls: Mutex<Vec<SearchCall>>,
}

impl RecordingSearch {
    /// Creates a search that returns nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `results` (capped at the limit) from every query.
    pub fn with_results(results: Vec<PatientFields>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    /// Fails every query with `status`.
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::default()
        }
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().clone()
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl RemoteSearch for RecordingSearch {
    fn query(
        &self,
        prefix: &str,
        limit: usize,
        fields: Option<&[String]>,
    ) -> CacheResult<Vec<PatientFields>> {
        self.calls.lock().push(SearchCall {
            prefix: prefix.to_string(),
            limit,
            fields: fields.map(<[String]>::to_vec),
        });

        if let Some(status) = self.fail_status {
            return Err(CacheError::remote_status("remote search failed", status));
        }
        Ok(self.results.iter().take(limit).cloned().collect())
    }
}
