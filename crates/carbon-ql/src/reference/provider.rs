use super::normalizer::normalize_name;
use super::source::{CoefficientSource, SourceError};
use super::{CpuReference, GridIntensityTable};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Raised when the backing source cannot produce reference data.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("coefficient source '{source_name}' unavailable after {attempts} attempt(s): {source}")]
    Unavailable {
        source_name: String,
        attempts: u32,
        #[source]
        source: SourceError,
    },
}

impl ProviderError {
    /// Whether a later call could succeed. Malformed data stays malformed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Unavailable { source, .. } => source.is_transient(),
        }
    }
}

/// Unknown names remembered before the miss set is cleared.
pub const MAX_CACHED_MISSES: usize = 1024;

/// Bounded exponential backoff applied to source fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << (retry.saturating_sub(1)).min(16);
        self.base_delay.saturating_mul(factor)
    }

    fn run<T>(
        &self,
        what: &str,
        mut fetch: impl FnMut() -> Result<T, SourceError>,
    ) -> Result<T, (u32, SourceError)> {
        let mut attempt = 1;
        loop {
            match fetch() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    let delay = self.delay_for(attempt);
                    debug!(what, attempt, ?delay, error = %err, "reference fetch failed, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err((attempt, err)),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

enum Slot {
    Empty,
    Missing,
    Ready(Arc<CpuReference>),
}

type SlotCell = Arc<Mutex<Slot>>;

/// Caching, retrying front for a [`CoefficientSource`].
///
/// Each known hardware name owns one cache slot. The first caller for a name
/// fetches while holding the slot lock, so concurrent first lookups wait and
/// then reuse the single stored entry. A lookup that finds nothing, or fails,
/// gives its slot back. Unknown names go to a miss set capped at
/// [`MAX_CACHED_MISSES`], so caller-supplied names cannot grow the cache
/// beyond the dataset.
pub struct ReferenceProvider {
    source: Box<dyn CoefficientSource>,
    retry: RetryPolicy,
    profiles: RwLock<HashMap<String, SlotCell>>,
    misses: Mutex<HashSet<String>>,
    grid: Mutex<Option<Arc<GridIntensityTable>>>,
}

impl ReferenceProvider {
    pub fn new<S>(source: S, retry: RetryPolicy) -> Self
    where
        S: CoefficientSource + 'static,
    {
        info!(
            source = %source.describe(),
            attempts = retry.attempts(),
            "reference provider initialised"
        );
        Self {
            source: Box::new(source),
            retry,
            profiles: RwLock::new(HashMap::new()),
            misses: Mutex::new(HashSet::new()),
            grid: Mutex::new(None),
        }
    }

    pub fn source_name(&self) -> String {
        self.source.describe()
    }

    /// Resolve a hardware-model name. `Ok(None)` means the source does not know it.
    pub fn cpu(&self, name: &str) -> Result<Option<Arc<CpuReference>>, ProviderError> {
        let key = normalize_name(name);
        if self.is_known_miss(&key) {
            return Ok(None);
        }

        let slot = self.slot_for(&key);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        match &*guard {
            Slot::Ready(reference) => return Ok(Some(Arc::clone(reference))),
            Slot::Missing => return Ok(None),
            Slot::Empty => {}
        }

        let fetched = match self.retry.run("cpu profile", || self.source.fetch_cpu(&key)) {
            Ok(fetched) => fetched,
            Err((attempts, source)) => {
                drop(guard);
                self.release_slot(&key, &slot);
                return Err(self.unavailable(attempts, source));
            }
        };

        match fetched {
            Some(reference) => {
                debug!(name = %key, "cached cpu reference profile");
                let reference = Arc::new(reference);
                *guard = Slot::Ready(Arc::clone(&reference));
                Ok(Some(reference))
            }
            None => {
                *guard = Slot::Missing;
                drop(guard);
                self.release_slot(&key, &slot);
                self.remember_miss(key);
                Ok(None)
            }
        }
    }

    /// Location-keyed grid intensity table, fetched once.
    pub fn grid_intensities(&self) -> Result<Arc<GridIntensityTable>, ProviderError> {
        let mut guard = self.grid.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = &*guard {
            return Ok(Arc::clone(table));
        }

        let table = self
            .retry
            .run("grid intensity table", || self.source.fetch_grid())
            .map_err(|(attempts, source)| self.unavailable(attempts, source))?;

        if table.is_empty() {
            warn!(
                source = %self.source.describe(),
                "grid intensity table is empty; all locations will use the fallback"
            );
        }

        let table = Arc::new(table);
        *guard = Some(Arc::clone(&table));
        Ok(table)
    }

    pub fn supported_locations(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.grid_intensities()?.locations())
    }

    /// Drop all cached entries so the next lookups hit the source again.
    pub fn refresh(&self) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.misses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.grid.lock().unwrap_or_else(PoisonError::into_inner) = None;
        info!(source = %self.source.describe(), "reference cache cleared");
    }

    fn slot_for(&self, key: &str) -> SlotCell {
        if let Some(slot) = self
            .profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(slot);
        }

        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            profiles
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Slot::Empty))),
        )
    }

    fn release_slot(&self, key: &str, slot: &SlotCell) {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        if profiles
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            profiles.remove(key);
        }
    }

    fn is_known_miss(&self, key: &str) -> bool {
        self.misses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn remember_miss(&self, key: String) {
        let mut misses = self.misses.lock().unwrap_or_else(PoisonError::into_inner);
        if misses.len() >= MAX_CACHED_MISSES {
            debug!(evicted = misses.len(), "unknown cpu name cache full, clearing");
            misses.clear();
        }
        debug!(name = %key, "cached unknown cpu name");
        misses.insert(key);
    }

    #[cfg(test)]
    fn cached_profiles(&self) -> usize {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    fn cached_misses(&self) -> usize {
        self.misses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn unavailable(&self, attempts: u32, source: SourceError) -> ProviderError {
        warn!(
            source_name = %self.source.describe(),
            attempts,
            error = %source,
            "reference data unavailable"
        );
        ProviderError::Unavailable {
            source_name: self.source.describe(),
            attempts,
            source,
        }
    }
}

impl std::fmt::Debug for ReferenceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceProvider")
            .field("source", &self.source.describe())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{BundledSource, CsvDirectorySource};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        inner: BundledSource,
        cpu_fetches: Arc<AtomicU32>,
        failures_before_success: u32,
        grid_calls: Arc<AtomicU32>,
    }

    impl CoefficientSource for CountingSource {
        fn fetch_cpu(&self, name: &str) -> Result<Option<CpuReference>, SourceError> {
            self.cpu_fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_cpu(name)
        }

        fn fetch_grid(&self) -> Result<GridIntensityTable, SourceError> {
            let call = self.grid_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(SourceError::Unavailable("connection reset".to_string()));
            }
            self.inner.fetch_grid()
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    fn counting(failures: u32) -> (CountingSource, Arc<AtomicU32>, Arc<AtomicU32>) {
        let cpu_fetches = Arc::new(AtomicU32::new(0));
        let grid_calls = Arc::new(AtomicU32::new(0));
        let source = CountingSource {
            inner: BundledSource::new(),
            cpu_fetches: cpu_fetches.clone(),
            failures_before_success: failures,
            grid_calls: grid_calls.clone(),
        };
        (source, cpu_fetches, grid_calls)
    }

    #[test]
    fn repeated_lookups_fetch_once() {
        let (source, cpu_fetches, _) = counting(0);
        let provider = ReferenceProvider::new(source, RetryPolicy::none());

        let first = provider.cpu("Intel Xeon Platinum 8272CL").expect("lookup");
        let second = provider.cpu("intel  xeon platinum 8272cl").expect("lookup");
        assert!(first.is_some());
        assert!(Arc::ptr_eq(
            first.as_ref().expect("first"),
            second.as_ref().expect("second")
        ));
        assert_eq!(cpu_fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_names_are_cached_as_misses() {
        let (source, cpu_fetches, _) = counting(0);
        let provider = ReferenceProvider::new(source, RetryPolicy::none());

        assert!(provider.cpu("Imaginary 9000").expect("lookup").is_none());
        assert!(provider.cpu("Imaginary 9000").expect("lookup").is_none());
        assert_eq!(cpu_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(provider.cached_profiles(), 0);
        assert_eq!(provider.cached_misses(), 1);
    }

    #[test]
    fn distinct_unknown_names_keep_the_cache_bounded() {
        let (source, _, _) = counting(0);
        let provider = ReferenceProvider::new(source, RetryPolicy::none());
        provider.cpu("Intel Xeon Platinum 8272CL").expect("lookup");

        for i in 0..(MAX_CACHED_MISSES * 3) {
            let name = format!("junk-{i}");
            assert!(provider.cpu(&name).expect("lookup").is_none());
        }

        assert_eq!(provider.cached_profiles(), 1);
        assert!(provider.cached_misses() <= MAX_CACHED_MISSES);
        assert!(provider.cpu("Intel Xeon Platinum 8272CL").expect("lookup").is_some());
    }

    #[test]
    fn failed_lookups_release_their_slot() {
        let provider = ReferenceProvider::new(
            CsvDirectorySource::new("./does-not-exist"),
            RetryPolicy::none(),
        );

        for i in 0..16 {
            assert!(provider.cpu(&format!("chip {i}")).is_err());
        }
        assert_eq!(provider.cached_profiles(), 0);
        assert_eq!(provider.cached_misses(), 0);
    }

    #[test]
    fn malformed_data_is_not_transient() {
        let unavailable = ProviderError::Unavailable {
            source_name: "test".to_string(),
            attempts: 1,
            source: SourceError::Malformed {
                line: 2,
                reason: "cores must be at least 1".to_string(),
            },
        };
        assert!(!unavailable.is_transient());

        let outage = ProviderError::Unavailable {
            source_name: "test".to_string(),
            attempts: 3,
            source: SourceError::Unavailable("connection reset".to_string()),
        };
        assert!(outage.is_transient());
    }

    #[test]
    fn concurrent_first_lookups_share_one_entry() {
        let (source, cpu_fetches, _) = counting(0);
        let provider = Arc::new(ReferenceProvider::new(source, RetryPolicy::none()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                thread::spawn(move || {
                    provider
                        .cpu("AMD EPYC 7763")
                        .expect("lookup")
                        .expect("known")
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect();

        assert!(results.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(cpu_fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_failures_are_retried_within_budget() {
        let (source, _, grid_calls) = counting(2);
        let provider = ReferenceProvider::new(source, RetryPolicy::new(3, Duration::ZERO));

        let table = provider.grid_intensities().expect("third attempt succeeds");
        assert!(!table.is_empty());
        assert_eq!(grid_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausted_retries_surface_unavailable() {
        let (source, _, grid_calls) = counting(5);
        let provider = ReferenceProvider::new(source, RetryPolicy::new(2, Duration::ZERO));

        match provider.grid_intensities() {
            Err(ProviderError::Unavailable { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected unavailable, got {other:?}"),
        }
        assert_eq!(grid_calls.load(Ordering::SeqCst), 2);

        // failure left the slot empty; the source recovers on later calls
        assert!(provider.grid_intensities().is_err());
        assert!(provider.grid_intensities().is_ok());
    }

    #[test]
    fn refresh_forces_refetch() {
        let (source, cpu_fetches, _) = counting(0);
        let provider = ReferenceProvider::new(source, RetryPolicy::none());

        provider.cpu("AWS Graviton2").expect("lookup");
        provider.refresh();
        provider.cpu("AWS Graviton2").expect("lookup");
        assert_eq!(cpu_fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }
}
