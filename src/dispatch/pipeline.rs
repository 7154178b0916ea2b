use std::sync::Arc;
use tracing::{error, info, warn};

use super::DispatchTask;
use crate::pr::ChangedFiles;
use crate::publish::Publisher;
use crate::summary::{Summarize, SummaryInput, SummaryOrigin};

/// The enrich → summarize → publish sequence run for one accepted event.
pub struct Pipeline {
    files: Arc<dyn ChangedFiles>,
    summarizer: Arc<dyn Summarize>,
    publisher: Arc<dyn Publisher>,
}

/// What happened in one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub files_fetched: bool,
    pub origin: Option<SummaryOrigin>,
    pub published: bool,
}

impl Pipeline {
    pub fn new(
        files: Arc<dyn ChangedFiles>,
        summarizer: Arc<dyn Summarize>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            files,
            summarizer,
            publisher,
        }
    }

    /// Run all three steps in order. A failing step is logged and the next
    /// one runs with what is available; nothing escapes as an error.
    pub async fn run(&self, task: DispatchTask) -> TaskOutcome {
        let DispatchTask {
            repo,
            mut metadata,
            activity,
            ..
        } = task;

        let files_fetched = match self.files.fetch_changed_files(&repo, metadata.number).await {
            Ok(paths) => {
                metadata.changed_file_paths = paths;
                true
            }
            Err(e) => {
                warn!(error = %e, "could not fetch changed files, continuing without them");
                metadata.changed_file_paths.clear();
                false
            }
        };

        let input = SummaryInput::new(&metadata).with_activity(activity);
        let summary = self.summarizer.summarize(&input).await;
        if summary.text.trim().is_empty() {
            error!(origin = %summary.origin, "summarizer returned empty text, skipping publish");
            return TaskOutcome {
                files_fetched,
                origin: None,
                published: false,
            };
        }
        info!(origin = %summary.origin, summary = %summary.text, "summary ready");

        let published = match self.publisher.publish(&summary, Some(&metadata)).await {
            Ok(()) => {
                info!(publisher = self.publisher.name(), "summary published");
                true
            }
            Err(e) => {
                warn!(publisher = self.publisher.name(), error = %e, "failed to publish summary");
                false
            }
        };

        TaskOutcome {
            files_fetched,
            origin: Some(summary.origin),
            published,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pr::{test_metadata, PrActivity, PrError, PullRequestMetadata, RepoRef};
    use crate::publish::PublishError;
    use crate::summary::{Generator, Prompt, Summarizer, SummaryError, SummaryResult};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// Shared, ordered record of which pipeline collaborator ran.
    pub(crate) type CallLog = Arc<Mutex<Vec<&'static str>>>;

    pub(crate) struct RecordingFiles {
        pub log: CallLog,
        pub result: Result<Vec<String>, u16>,
    }

    #[async_trait]
    impl ChangedFiles for RecordingFiles {
        async fn fetch_changed_files(
            &self,
            _repo: &RepoRef,
            _number: u64,
        ) -> Result<Vec<String>, PrError> {
            self.log.lock().unwrap().push("enrich");
            self.result.clone().map_err(PrError::Status)
        }
    }

    /// File source that blocks until the test adds permits to `gate`.
    pub(crate) struct GatedFiles {
        pub gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl ChangedFiles for GatedFiles {
        async fn fetch_changed_files(
            &self,
            _repo: &RepoRef,
            _number: u64,
        ) -> Result<Vec<String>, PrError> {
            let _permit = self.gate.acquire().await.unwrap();
            Ok(Vec::new())
        }
    }

    pub(crate) struct RecordingGenerator {
        pub log: CallLog,
        pub reply: Option<String>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, _prompt: &Prompt) -> Result<String, SummaryError> {
            self.log.lock().unwrap().push("summarize");
            self.reply.clone().ok_or(SummaryError::Api {
                status: 503,
                message: "unavailable".to_string(),
            })
        }
    }

    pub(crate) struct RecordingPublisher {
        pub log: CallLog,
        pub fail: bool,
        pub published: Mutex<Vec<(SummaryResult, Option<PullRequestMetadata>)>>,
    }

    impl RecordingPublisher {
        pub(crate) fn new(log: CallLog, fail: bool) -> Self {
            Self {
                log,
                fail,
                published: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        fn name(&self) -> &str {
            "recording"
        }

        async fn publish(
            &self,
            summary: &SummaryResult,
            metadata: Option<&PullRequestMetadata>,
        ) -> Result<(), PublishError> {
            self.log.lock().unwrap().push("publish");
            self.published
                .lock()
                .unwrap()
                .push((summary.clone(), metadata.cloned()));
            if self.fail {
                Err(PublishError::Status(502))
            } else {
                Ok(())
            }
        }
    }

    pub(crate) fn test_task(number: u64, author: &str, title: &str) -> DispatchTask {
        DispatchTask {
            repo: RepoRef::new("octo", "widgets"),
            metadata: test_metadata(number, author, title),
            activity: PrActivity::Opened,
            delivery: Some("delivery-1".to_string()),
        }
    }

    fn pipeline(
        log: &CallLog,
        files: Result<Vec<String>, u16>,
        reply: Option<&str>,
        publisher: Arc<RecordingPublisher>,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(RecordingFiles {
                log: log.clone(),
                result: files,
            }),
            Arc::new(Summarizer::new(Arc::new(RecordingGenerator {
                log: log.clone(),
                reply: reply.map(str::to_string),
            }))),
            publisher,
        )
    }

    /// Summarizer whose result bypasses the fallback, e.g. a blank text.
    struct FixedSummary {
        log: CallLog,
        result: SummaryResult,
    }

    #[async_trait]
    impl Summarize for FixedSummary {
        async fn summarize(&self, _input: &SummaryInput<'_>) -> SummaryResult {
            self.log.lock().unwrap().push("summarize");
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let log = CallLog::default();
        let publisher = Arc::new(RecordingPublisher::new(log.clone(), false));
        let outcome = pipeline(
            &log,
            Ok(vec!["src/lib.rs".to_string()]),
            Some("Today alice fixed a bug."),
            publisher.clone(),
        )
        .run(test_task(42, "alice", "Fix bug"))
        .await;

        assert_eq!(*log.lock().unwrap(), vec!["enrich", "summarize", "publish"]);
        assert_eq!(
            outcome,
            TaskOutcome {
                files_fetched: true,
                origin: Some(SummaryOrigin::Ai),
                published: true,
            }
        );
        let published = publisher.published.lock().unwrap();
        let meta = published[0].1.as_ref().unwrap();
        assert_eq!(meta.changed_file_paths, vec!["src/lib.rs"]);
    }

    #[tokio::test]
    async fn test_enrichment_failure_continues_with_empty_list() {
        let log = CallLog::default();
        let publisher = Arc::new(RecordingPublisher::new(log.clone(), false));
        let outcome = pipeline(&log, Err(401), Some("ok"), publisher.clone())
            .run(test_task(42, "alice", "Fix bug"))
            .await;

        assert!(!outcome.files_fetched);
        assert!(outcome.published);
        let published = publisher.published.lock().unwrap();
        assert!(published[0].1.as_ref().unwrap().changed_file_paths.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_still_completes() {
        let log = CallLog::default();
        let publisher = Arc::new(RecordingPublisher::new(log.clone(), true));
        let outcome = pipeline(&log, Ok(Vec::new()), None, publisher.clone())
            .run(test_task(42, "alice", "Fix bug"))
            .await;

        assert_eq!(outcome.origin, Some(SummaryOrigin::Fallback));
        assert!(!outcome.published);
        let published = publisher.published.lock().unwrap();
        assert!(published[0].0.text.contains("alice"));
        assert!(published[0].0.text.contains("#42"));
    }

    #[tokio::test]
    async fn test_empty_summary_skips_publish() {
        for text in ["", "  \n\t"] {
            let log = CallLog::default();
            let publisher = Arc::new(RecordingPublisher::new(log.clone(), false));
            let pipeline = Pipeline::new(
                Arc::new(RecordingFiles {
                    log: log.clone(),
                    result: Ok(Vec::new()),
                }),
                Arc::new(FixedSummary {
                    log: log.clone(),
                    result: SummaryResult::ai(text),
                }),
                publisher.clone(),
            );

            let outcome = pipeline.run(test_task(42, "alice", "Fix bug")).await;

            assert_eq!(
                outcome,
                TaskOutcome {
                    files_fetched: true,
                    origin: None,
                    published: false,
                }
            );
            assert_eq!(*log.lock().unwrap(), vec!["enrich", "summarize"]);
            assert!(publisher.published.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_summary_describes_the_reported_activity() {
        let log = CallLog::default();
        let publisher = Arc::new(RecordingPublisher::new(log.clone(), false));
        let mut task = test_task(42, "alice", "Fix bug");
        task.activity = PrActivity::Synchronized;

        pipeline(&log, Ok(Vec::new()), None, publisher.clone())
            .run(task)
            .await;

        let published = publisher.published.lock().unwrap();
        assert!(
            published[0]
                .0
                .text
                .starts_with("Today alice pushed new commits to PR #42: Fix bug."),
            "{}",
            published[0].0.text
        );
    }
}
