use std::sync::Arc;
use std::time::Duration;

use super::source::{SourceFactory, TranscriptSource, UpstreamError};
use super::TranscriptResult;
use crate::config::RetryConfig;
use crate::proxy::ProxyRotator;

/// How one attempt ended, seen from the retry loop
enum AttemptError {
    /// Definitive; surface immediately and keep the remaining budget unused
    Permanent(String),
    /// May clear up behind a different proxy
    Transient(String),
}

/// Fetches transcripts with language fallback and a bounded retry budget
///
/// Each attempt gets a freshly built source so it can ride a newly rotated
/// proxy. Retrying only makes sense while rotation is available: with a fixed
/// egress identity the loop stops after the first transient failure.
pub struct TranscriptFetcher {
    factory: Arc<dyn SourceFactory>,
    rotator: Option<Arc<dyn ProxyRotator>>,
    max_attempts: u32,
    backoff: Duration,
}

impl TranscriptFetcher {
    pub fn new(
        factory: Arc<dyn SourceFactory>,
        rotator: Option<Arc<dyn ProxyRotator>>,
        retry: &RetryConfig,
    ) -> Self {
        Self {
            factory,
            rotator,
            max_attempts: retry.max_attempts.max(1),
            backoff: Duration::from_secs(retry.backoff_secs),
        }
    }

    /// Fetch a transcript, trying `languages` in priority order
    ///
    /// Never fails across this boundary; every outcome is a
    /// [`TranscriptResult`] carrying the attempt count.
    pub async fn get_transcript(&self, video_id: &str, languages: &[String]) -> TranscriptResult {
        let mut last_error = String::new();
        let mut attempts_used = 0;

        for attempt in 1..=self.max_attempts {
            attempts_used = attempt;

            let proxy = match &self.rotator {
                Some(rotator) => match rotator.next().await {
                    Ok(proxy) => proxy,
                    Err(e) => {
                        // Rotation being broken should not kill the fetch;
                        // go out directly instead.
                        tracing::warn!("Proxy rotation failed, attempting without proxy: {e}");
                        None
                    }
                },
                None => None,
            };

            if let Some(endpoint) = &proxy {
                tracing::debug!(attempt, proxy = %endpoint.describe(), "Fetching transcript");
            }

            let source = match self.factory.create(proxy.as_ref()) {
                Ok(source) => source,
                Err(e) => {
                    last_error = format!("Could not build upstream client: {e}");
                    if self.should_retry(attempt) {
                        tokio::time::sleep(self.backoff).await;
                        continue;
                    }
                    break;
                }
            };

            match self.try_attempt(&*source, video_id, languages).await {
                Ok(mut result) => {
                    result.attempts = attempt;
                    if attempt > 1 {
                        tracing::info!("Transcript fetched on attempt {attempt}/{}", self.max_attempts);
                    }
                    return result;
                }
                Err(AttemptError::Permanent(error)) => {
                    tracing::info!("Transcript unavailable for {video_id}: {error}");
                    return TranscriptResult::failed(error, attempt);
                }
                Err(AttemptError::Transient(error)) => {
                    tracing::warn!(
                        "Attempt {attempt}/{} failed: {error}",
                        self.max_attempts
                    );
                    last_error = error;
                    if self.should_retry(attempt) {
                        tokio::time::sleep(self.backoff).await;
                        continue;
                    }
                    break;
                }
            }
        }

        TranscriptResult::failed(
            format!(
                "Failed after {attempts_used} attempt(s). Last error: {last_error}"
            ),
            attempts_used,
        )
    }

    /// Retries are worthwhile only with budget left and a rotator to hand the
    /// next attempt a different identity.
    fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts && self.rotator.is_some()
    }

    /// One attempt: walk the language priority list, then fall back to the
    /// first track the upstream offers.
    async fn try_attempt(
        &self,
        source: &dyn TranscriptSource,
        video_id: &str,
        languages: &[String],
    ) -> Result<TranscriptResult, AttemptError> {
        for language in languages {
            match source.fetch(video_id, Some(language)).await {
                Ok(track) => {
                    return Ok(TranscriptResult::found(
                        track.entries,
                        language.clone(),
                        track.kind,
                        0,
                    ));
                }
                // Absence of one language track is definitive for that
                // language only; move on without touching the retry budget.
                Err(UpstreamError::NotFoundForLanguage { .. }) => continue,
                Err(e) if e.is_permanent() => return Err(AttemptError::Permanent(e.to_string())),
                Err(e) => return Err(AttemptError::Transient(e.to_string())),
            }
        }

        // None of the preferred languages exist; take whatever the upstream
        // lists first.
        match source.fetch(video_id, None).await {
            Ok(track) => Ok(TranscriptResult::found(
                track.entries,
                "unknown",
                track.kind,
                0,
            )),
            Err(UpstreamError::NotFoundForLanguage { .. }) => Err(AttemptError::Permanent(
                UpstreamError::NoTranscriptAvailable.to_string(),
            )),
            Err(e) if e.is_permanent() => Err(AttemptError::Permanent(e.to_string())),
            Err(e) => Err(AttemptError::Transient(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyEndpoint;
    use crate::transcript::source::FetchedTrack;
    use crate::transcript::{TrackKind, TranscriptEntry};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn track(language: &str) -> FetchedTrack {
        FetchedTrack {
            entries: vec![TranscriptEntry {
                text: format!("hello in {language}"),
                start: 0.0,
                duration: 2.0,
            }],
            language_code: language.to_string(),
            kind: TrackKind::Generated,
        }
    }

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            backoff_secs: 0,
        }
    }

    /// Hands out clones of one mock source for every attempt
    struct CloneFactory<S>(S);

    impl<S> SourceFactory for CloneFactory<S>
    where
        S: TranscriptSource + Clone + 'static,
    {
        fn create(
            &self,
            _proxy: Option<&ProxyEndpoint>,
        ) -> anyhow::Result<Box<dyn TranscriptSource>> {
            Ok(Box::new(self.0.clone()))
        }
    }

    /// Serves only the listed languages; unqualified fetches fail
    #[derive(Clone)]
    struct LanguageMapSource {
        available: HashMap<String, FetchedTrack>,
    }

    #[async_trait]
    impl TranscriptSource for LanguageMapSource {
        async fn fetch(
            &self,
            _video_id: &str,
            language: Option<&str>,
        ) -> Result<FetchedTrack, UpstreamError> {
            match language {
                Some(lang) => self.available.get(lang).cloned().ok_or_else(|| {
                    UpstreamError::NotFoundForLanguage {
                        language: lang.to_string(),
                    }
                }),
                None => Err(UpstreamError::NoTranscriptAvailable),
            }
        }
    }

    /// Fails with a transient error for the first `failures` calls
    #[derive(Clone)]
    struct FlakySource {
        failures: u32,
        calls: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl TranscriptSource for FlakySource {
        async fn fetch(
            &self,
            _video_id: &str,
            _language: Option<&str>,
        ) -> Result<FetchedTrack, UpstreamError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.failures {
                Err(UpstreamError::Transient("connection reset".to_string()))
            } else {
                Ok(track("en"))
            }
        }
    }

    /// Always fails the same way
    #[derive(Clone)]
    struct FailingSource {
        error: fn() -> UpstreamError,
    }

    #[async_trait]
    impl TranscriptSource for FailingSource {
        async fn fetch(
            &self,
            _video_id: &str,
            _language: Option<&str>,
        ) -> Result<FetchedTrack, UpstreamError> {
            Err((self.error)())
        }
    }

    /// Counts rotations and always offers the same endpoint
    struct CountingRotator {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ProxyRotator for CountingRotator {
        async fn next(&self) -> crate::Result<Option<ProxyEndpoint>> {
            *self.calls.lock().unwrap() += 1;
            Ok(Some(ProxyEndpoint {
                host: "proxy.test".to_string(),
                port: 8080,
                username: "u".to_string(),
                password: "p".to_string(),
                country_code: None,
                city: None,
            }))
        }

        async fn endpoints(&self) -> crate::Result<Vec<ProxyEndpoint>> {
            Ok(Vec::new())
        }

        fn strategy_name(&self) -> &'static str {
            "counting"
        }
    }

    /// Rotation that can never produce an endpoint
    struct BrokenRotator;

    #[async_trait]
    impl ProxyRotator for BrokenRotator {
        async fn next(&self) -> crate::Result<Option<ProxyEndpoint>> {
            Err(anyhow::anyhow!("provider unreachable"))
        }

        async fn endpoints(&self) -> crate::Result<Vec<ProxyEndpoint>> {
            Ok(Vec::new())
        }

        fn strategy_name(&self) -> &'static str {
            "broken"
        }
    }

    /// Hands out clones of one mock source and insists no proxy was supplied
    struct ProxylessFactory<S>(S);

    impl<S> SourceFactory for ProxylessFactory<S>
    where
        S: TranscriptSource + Clone + 'static,
    {
        fn create(
            &self,
            proxy: Option<&ProxyEndpoint>,
        ) -> anyhow::Result<Box<dyn TranscriptSource>> {
            assert!(proxy.is_none(), "expected no proxy after rotation failure");
            Ok(Box::new(self.0.clone()))
        }
    }

    fn rotator() -> Arc<CountingRotator> {
        Arc::new(CountingRotator {
            calls: Mutex::new(0),
        })
    }

    #[tokio::test]
    async fn language_fallback_does_not_consume_attempts() {
        let mut available = HashMap::new();
        available.insert("hi".to_string(), track("hi"));
        let factory = Arc::new(CloneFactory(LanguageMapSource { available }));

        let fetcher = TranscriptFetcher::new(factory, Some(rotator()), &retry(5));
        let result = fetcher
            .get_transcript("vid1", &langs(&["bn", "en", "hi"]))
            .await;

        assert!(result.success);
        assert_eq!(result.language_code, "hi");
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn no_preferred_language_falls_back_to_first_available() {
        let mut available = HashMap::new();
        available.insert("de".to_string(), track("de"));
        let source = LanguageMapSource { available };

        // Unqualified fetch succeeds here even though no preferred language matches
        #[derive(Clone)]
        struct FallbackSource(LanguageMapSource);

        #[async_trait]
        impl TranscriptSource for FallbackSource {
            async fn fetch(
                &self,
                video_id: &str,
                language: Option<&str>,
            ) -> Result<FetchedTrack, UpstreamError> {
                match language {
                    Some(_) => self.0.fetch(video_id, language).await,
                    None => Ok(track("de")),
                }
            }
        }

        let factory = Arc::new(CloneFactory(FallbackSource(source)));
        let fetcher = TranscriptFetcher::new(factory, Some(rotator()), &retry(5));
        let result = fetcher.get_transcript("vid1", &langs(&["bn", "en"])).await;

        assert!(result.success);
        assert_eq!(result.language_code, "unknown");
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn broken_rotation_falls_back_to_direct_fetch() {
        let mut available = HashMap::new();
        available.insert("en".to_string(), track("en"));
        let factory = Arc::new(ProxylessFactory(LanguageMapSource { available }));

        let fetcher = TranscriptFetcher::new(factory, Some(Arc::new(BrokenRotator)), &retry(5));
        let result = fetcher.get_transcript("vid1", &langs(&["en"])).await;

        assert!(result.success);
        assert_eq!(result.language_code, "en");
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn transient_failures_then_success_uses_budget() {
        let factory = Arc::new(CloneFactory(FlakySource {
            failures: 4,
            calls: Arc::new(Mutex::new(0)),
        }));

        let fetcher = TranscriptFetcher::new(factory, Some(rotator()), &retry(5));
        let result = fetcher.get_transcript("vid1", &langs(&["en"])).await;

        assert!(result.success);
        assert_eq!(result.attempts, 5);
    }

    #[tokio::test]
    async fn exhausted_budget_reports_last_error() {
        let factory = Arc::new(CloneFactory(FailingSource {
            error: || UpstreamError::Transient("IP blocked by upstream".to_string()),
        }));

        let fetcher = TranscriptFetcher::new(factory, Some(rotator()), &retry(5));
        let result = fetcher.get_transcript("vid1", &langs(&["en"])).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 5);
        let error = result.error.unwrap();
        assert!(error.contains("IP blocked by upstream"), "error was: {error}");
        assert!(error.contains("5 attempt"), "error was: {error}");
    }

    #[tokio::test]
    async fn disabled_transcripts_fail_without_retry() {
        let factory = Arc::new(CloneFactory(FailingSource {
            error: || UpstreamError::TranscriptsDisabled,
        }));

        let fetcher = TranscriptFetcher::new(factory, Some(rotator()), &retry(5));
        let result = fetcher.get_transcript("vid1", &langs(&["en"])).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error.unwrap(), "Transcripts disabled");
    }

    #[tokio::test]
    async fn missing_everywhere_is_permanent() {
        let factory = Arc::new(CloneFactory(LanguageMapSource {
            available: HashMap::new(),
        }));

        let fetcher = TranscriptFetcher::new(factory, Some(rotator()), &retry(5));
        let result = fetcher.get_transcript("vid1", &langs(&["bn", "en"])).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error.unwrap(), "No transcript found");
    }

    #[tokio::test]
    async fn no_rotation_means_no_retry() {
        let calls = Arc::new(Mutex::new(0));
        let factory = Arc::new(CloneFactory(FlakySource {
            failures: 10,
            calls: calls.clone(),
        }));

        let fetcher = TranscriptFetcher::new(factory, None, &retry(5));
        let result = fetcher.get_transcript("vid1", &langs(&["en"])).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn each_attempt_rotates_the_proxy() {
        let rotator = rotator();
        let factory = Arc::new(CloneFactory(FlakySource {
            failures: 2,
            calls: Arc::new(Mutex::new(0)),
        }));

        let fetcher = TranscriptFetcher::new(factory, Some(rotator.clone()), &retry(5));
        let result = fetcher.get_transcript("vid1", &langs(&["en"])).await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(*rotator.calls.lock().unwrap(), 3);
    }
}
