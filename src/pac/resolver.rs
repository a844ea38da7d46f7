// src/pac/resolver.rs
//! The PAC resolution entry point.
//!
//! A [`PacResolver`] owns one PAC document. The document is fetched on the
//! first request that misses the cache and is then constant for the lifetime
//! of the resolver.

use super::cache::{MemoryCache, ResolutionResult, ResultCache};
use super::downloader::{ContentLoader, HttpContentLoader, DEFAULT_FETCH_TIMEOUT};
use super::engine::{PacEvaluator, SandboxedEvaluator, ScriptSource};
use super::guard::ReentrancyGuard;
use super::helpers::HelperLibrary;
use super::policy::SandboxPolicy;
use crate::config::ResolverConfig;
use crate::error::{PacError, PacResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

pub const DEFAULT_ENTRY_POINT: &str = "FindProxyForURL";

/// Message key reported when the PAC document cannot be fetched.
pub const CREATION_FAILED_KEY: &str = "proxy.error.creationFailed";

/// Message key reported for the first failing evaluation.
pub const EVALUATION_FAILED_KEY: &str = "proxy.error.evaluationFailed";

/// Presents resolver failures to the user.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, message_key: &str, error: &PacError);
}

/// Terminates the hosting process after a fatal failure.
pub trait ExitHook: Send + Sync {
    fn exit(&self, code: i32) -> !;
}

/// Reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, message_key: &str, error: &PacError) {
        error!(key = message_key, "{}", error);
    }
}

/// Calls [`std::process::exit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl ExitHook for ProcessExit {
    fn exit(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// PAC script text together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacDocument {
    source_url: Url,
    content: String,
}

impl PacDocument {
    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Resolves destinations to PAC proxy lists.
///
/// Shareable across threads. See [`PacResolver::resolve`].
pub struct PacResolver {
    pac_url: Url,
    entry_point: String,
    helpers: HelperLibrary,
    document: OnceLock<PacDocument>,
    load_lock: Mutex<()>,
    loading_thread: Mutex<Option<ThreadId>>,
    loader: Box<dyn ContentLoader>,
    evaluator: Box<dyn PacEvaluator>,
    cache: Arc<dyn ResultCache>,
    reporter: Box<dyn ErrorReporter>,
    exit_hook: Box<dyn ExitHook>,
    failure_reported: AtomicBool,
}

impl fmt::Debug for PacResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacResolver")
            .field("pac_url", &self.pac_url.as_str())
            .field("entry_point", &self.entry_point)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl PacResolver {
    pub fn builder(pac_url: Url) -> PacResolverBuilder {
        PacResolverBuilder::new(pac_url)
    }

    pub fn from_config(config: &ResolverConfig) -> PacResult<Self> {
        Self::builder(config.pac_url.clone())
            .entry_point(config.entry_point.clone())
            .fetch_timeout(config.fetch_timeout())
            .cache(Arc::new(MemoryCache::with_ttl(config.cache_ttl())))
            .policy(config.policy())
            .build()
    }

    pub fn pac_url(&self) -> &Url {
        &self.pac_url
    }

    pub fn is_loaded(&self) -> bool {
        self.document.get().is_some()
    }

    pub fn document(&self) -> Option<&PacDocument> {
        self.document.get()
    }

    /// Get the proxies for accessing `uri`.
    ///
    /// Returns a proxy list such as `"PROXY foo.example.com:8080; DIRECT"`,
    /// or `None` when the script wants no proxy. `None` is also returned,
    /// without blocking, when this thread is itself loading the PAC document.
    ///
    /// A PAC document that cannot be fetched is fatal: the failure is
    /// reported and the exit hook is invoked.
    pub fn resolve(&self, uri: &Url) -> PacResult<ResolutionResult> {
        ReentrancyGuard::with_current(|guard| self.resolve_with(guard, uri))
    }

    pub fn resolve_str(&self, uri: &str) -> PacResult<ResolutionResult> {
        self.resolve(&Url::parse(uri)?)
    }

    /// Same as [`resolve`](Self::resolve) with an explicit per-worker guard.
    pub fn resolve_with(&self, guard: &ReentrancyGuard, uri: &Url) -> PacResult<ResolutionResult> {
        if let Some(cached) = self.cache.get(uri) {
            debug!("Cached PAC result for url '{}' -> '{:?}'", uri, cached);
            return Ok(cached);
        }

        let document = match self.load_document(guard) {
            Some(Ok(document)) => document,
            Some(Err(err)) => self.fail(err),
            None => {
                // Loading the PAC document asked for a proxy again.
                debug!("PAC document is being loaded, no proxy for '{}'", uri);
                return Ok(None);
            }
        };

        let host = host_of(uri);
        let helpers = ScriptSource::new(HelperLibrary::SCRIPT_NAME, self.helpers.source());
        let pac = ScriptSource::new(document.source_url.as_str(), &document.content);

        match self
            .evaluator
            .evaluate(&helpers, &pac, &self.entry_point, &[uri.as_str(), &host])
        {
            Ok(result) => {
                debug!("PAC result for url '{}' -> '{:?}'", uri, result);
                self.cache.insert(uri, result.clone());
                Ok(result)
            }
            Err(err) => {
                self.report_evaluation_failure(&err);
                Err(err)
            }
        }
    }

    /// Fetches the PAC document now instead of on first use.
    ///
    /// Unlike [`resolve`](Self::resolve) a fetch failure is returned, not fatal.
    pub fn preload(&self) -> PacResult<()> {
        ReentrancyGuard::with_current(|guard| match self.load_document(guard) {
            Some(Err(err)) => Err(err),
            _ => Ok(()),
        })
    }

    /// `None` means this worker, or this thread under another guard, is
    /// already loading.
    fn load_document(&self, guard: &ReentrancyGuard) -> Option<PacResult<&PacDocument>> {
        if let Some(document) = self.document.get() {
            return Some(Ok(document));
        }
        if !guard.try_begin_load() {
            return None;
        }
        let _loading = scopeguard::guard(guard, |guard| guard.finish_load());

        // Checked before `load_lock`, which the loading thread already holds.
        let current = thread::current().id();
        if *self.lock_loading_thread() == Some(current) {
            return None;
        }

        let _single_flight = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(document) = self.document.get() {
            return Some(Ok(document));
        }

        *self.lock_loading_thread() = Some(current);
        let _owner = scopeguard::guard(self, |resolver| *resolver.lock_loading_thread() = None);

        Some(
            self.fetch()
                .map(|document| self.document.get_or_init(|| document)),
        )
    }

    fn lock_loading_thread(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.loading_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch(&self) -> PacResult<PacDocument> {
        debug!("Open PAC url '{}'", self.pac_url);
        let content = self
            .loader
            .load(&self.pac_url)
            .map_err(|source| PacError::DocumentFetch {
                url: self.pac_url.to_string(),
                source,
            })?;
        Ok(PacDocument {
            source_url: self.pac_url.clone(),
            content,
        })
    }

    fn fail(&self, err: PacError) -> ! {
        warn!("Cannot open PAC url '{}' due to {}", self.pac_url, err);
        self.reporter.report(CREATION_FAILED_KEY, &err);
        self.exit_hook.exit(-1)
    }

    fn report_evaluation_failure(&self, err: &PacError) {
        if self.failure_reported.swap(true, Ordering::Relaxed) {
            debug!("PAC evaluation failed again: {}", err);
        } else {
            warn!("PAC evaluation failed: {}", err);
            self.reporter.report(EVALUATION_FAILED_KEY, err);
        }
    }
}

fn host_of(uri: &Url) -> String {
    uri.host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
        .unwrap_or_default()
}

/// Builder for [`PacResolver`].
pub struct PacResolverBuilder {
    pac_url: Url,
    entry_point: String,
    fetch_timeout: Duration,
    policy: SandboxPolicy,
    loader: Option<Box<dyn ContentLoader>>,
    evaluator: Option<Box<dyn PacEvaluator>>,
    cache: Option<Arc<dyn ResultCache>>,
    reporter: Box<dyn ErrorReporter>,
    exit_hook: Box<dyn ExitHook>,
}

impl PacResolverBuilder {
    pub fn new(pac_url: Url) -> Self {
        Self {
            pac_url,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            policy: SandboxPolicy::default(),
            loader: None,
            evaluator: None,
            cache: None,
            reporter: Box::new(LogReporter),
            exit_hook: Box::new(ProcessExit),
        }
    }

    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    /// Timeout of the default HTTP loader.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Policy of the default evaluator.
    pub fn policy(mut self, policy: SandboxPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn loader(mut self, loader: impl ContentLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn evaluator(mut self, evaluator: impl PacEvaluator + 'static) -> Self {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn exit_hook(mut self, exit_hook: impl ExitHook + 'static) -> Self {
        self.exit_hook = Box::new(exit_hook);
        self
    }

    pub fn build(self) -> PacResult<PacResolver> {
        debug!("Create PAC evaluator for '{}'", self.pac_url);

        let loader: Box<dyn ContentLoader> = match self.loader {
            Some(loader) => loader,
            None => Box::new(
                HttpContentLoader::with_timeout(self.fetch_timeout).map_err(|source| {
                    PacError::DocumentFetch {
                        url: self.pac_url.to_string(),
                        source,
                    }
                })?,
            ),
        };
        let evaluator: Box<dyn PacEvaluator> = self
            .evaluator
            .unwrap_or_else(|| Box::new(SandboxedEvaluator::new(self.policy)));
        let cache: Arc<dyn ResultCache> = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new()));

        Ok(PacResolver {
            pac_url: self.pac_url,
            entry_point: self.entry_point,
            helpers: HelperLibrary::bundled(),
            document: OnceLock::new(),
            load_lock: Mutex::new(()),
            loading_thread: Mutex::new(None),
            loader,
            evaluator,
            cache,
            reporter: self.reporter,
            exit_hook: self.exit_hook,
            failure_reported: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::sync::atomic::AtomicUsize;

    struct StaticLoader {
        script: &'static str,
        loads: Arc<AtomicUsize>,
    }

    impl ContentLoader for StaticLoader {
        fn load(&self, _url: &Url) -> Result<String, FetchError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.script.to_string())
        }
    }

    #[derive(Clone, Default)]
    struct CountingReporter {
        keys: Arc<Mutex<Vec<String>>>,
    }

    impl ErrorReporter for CountingReporter {
        fn report(&self, message_key: &str, _error: &PacError) {
            self.keys.lock().unwrap().push(message_key.to_string());
        }
    }

    fn resolver(script: &'static str) -> (PacResolver, Arc<AtomicUsize>, CountingReporter) {
        let loads = Arc::new(AtomicUsize::new(0));
        let reporter = CountingReporter::default();
        let resolver = PacResolver::builder(Url::parse("http://wpad.example.com/wpad.dat").unwrap())
            .loader(StaticLoader {
                script,
                loads: loads.clone(),
            })
            .reporter(reporter.clone())
            .build()
            .unwrap();
        (resolver, loads, reporter)
    }

    #[test]
    fn test_host_of_strips_ipv6_brackets() {
        assert_eq!(host_of(&Url::parse("http://[::1]:8080/").unwrap()), "::1");
        assert_eq!(host_of(&Url::parse("http://example.com/").unwrap()), "example.com");
        assert_eq!(host_of(&Url::parse("data:text/plain,hi").unwrap()), "");
    }

    #[test]
    fn test_document_is_loaded_lazily() {
        let (resolver, loads, _) =
            resolver("function FindProxyForURL(u, h) { return \"DIRECT\"; }");
        assert!(!resolver.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        resolver.resolve_str("http://example.com/").unwrap();
        assert!(resolver.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(resolver.document().unwrap().content().contains("DIRECT"));
    }

    #[test]
    fn test_preload_fetches_once() {
        let (resolver, loads, _) =
            resolver("function FindProxyForURL(u, h) { return \"DIRECT\"; }");
        resolver.preload().unwrap();
        resolver.preload().unwrap();
        resolver.resolve_str("http://example.com/").unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tripped_guard_returns_no_result() {
        let (resolver, loads, _) =
            resolver("function FindProxyForURL(u, h) { return \"DIRECT\"; }");
        let guard = ReentrancyGuard::new();
        assert!(guard.try_begin_load());

        let result = resolver
            .resolve_with(&guard, &Url::parse("http://example.com/").unwrap())
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert!(guard.is_loading());
    }

    #[test]
    fn test_custom_entry_point() {
        let loads = Arc::new(AtomicUsize::new(0));
        let resolver = PacResolver::builder(Url::parse("http://wpad/wpad.dat").unwrap())
            .entry_point("FindProxyForURLEx")
            .loader(StaticLoader {
                script: "function FindProxyForURLEx(u, h) { return \"PROXY ex:3128\"; }",
                loads,
            })
            .build()
            .unwrap();
        assert_eq!(
            resolver.resolve_str("http://example.com/").unwrap().as_deref(),
            Some("PROXY ex:3128")
        );
    }

    #[test]
    fn test_evaluation_failure_is_reported_once_and_not_cached() {
        let (resolver, _, reporter) = resolver("function NotTheEntryPoint() {}");

        for _ in 0..3 {
            let err = resolver.resolve_str("http://example.com/").unwrap_err();
            assert!(matches!(err, PacError::MissingEntryPoint { .. }));
        }
        assert_eq!(
            reporter.keys.lock().unwrap().as_slice(),
            &[EVALUATION_FAILED_KEY.to_string()]
        );
    }
}
