//! Asynchronous export queue.
//!
//! Jobs live in an in-memory table guarded by its own lock. One background
//! worker task polls the table for the oldest pending job, renders it on the
//! blocking pool and records the outcome; when nothing is pending it sleeps
//! for the poll interval. Rendering therefore never runs in parallel with
//! itself, and at most one job is `working` at any instant.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::domain::{AppError, DataLayout, ExportFormat, ExportJob, ExportStatus, Result};
use crate::infrastructure::{
    remove_dir_if_exists, zip_directory, ConverterChain, PdfRequest, ThreadStore,
};

use super::renderer::render_bundle;

/// State shared between callers and the worker.
struct QueueInner {
    layout: DataLayout,
    store: Arc<ThreadStore>,
    converters: ConverterChain,
    jobs: Mutex<HashMap<String, ExportJob>>,
    poll_interval: Duration,
    shutdown: AtomicBool,
    wake: Notify,
}

/// Handle to the export job table and its worker.
pub struct ExportQueue {
    inner: Arc<QueueInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExportQueue {
    /// Create the queue and spawn its worker on the current tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn start(
        layout: DataLayout,
        store: Arc<ThreadStore>,
        converters: ConverterChain,
        poll_interval: Duration,
    ) -> Self {
        let inner = Arc::new(QueueInner {
            layout,
            store,
            converters,
            jobs: Mutex::new(HashMap::new()),
            poll_interval,
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
        });

        let worker = tokio::spawn(run_worker(Arc::clone(&inner)));

        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Record a pending job and return a snapshot of it.
    pub fn enqueue(&self, thread_id: &str, format: ExportFormat) -> ExportJob {
        let job = ExportJob::new(thread_id, format);
        self.inner.jobs.lock().insert(job.id.clone(), job.clone());

        tracing::info!(job_id = %job.id, thread_id = %thread_id, format = %format, "Export job enqueued");
        job
    }

    /// Snapshot of a job.
    #[must_use]
    pub fn status(&self, job_id: &str) -> Option<ExportJob> {
        self.inner.jobs.lock().get(job_id).cloned()
    }

    /// Artifact path of a finished job.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown job and `Conflict` with the current
    /// status for any job that is not `done`.
    pub fn download(&self, job_id: &str) -> Result<PathBuf> {
        let job = self
            .status(job_id)
            .ok_or_else(|| AppError::job_not_found(job_id))?;

        match (job.status, job.result_path) {
            (ExportStatus::Done, Some(path)) => Ok(path),
            (status, _) => Err(AppError::Conflict { status }),
        }
    }

    /// Number of jobs currently `working`.
    #[must_use]
    pub fn working_count(&self) -> usize {
        self.inner
            .jobs
            .lock()
            .values()
            .filter(|j| j.status == ExportStatus::Working)
            .count()
    }

    /// Drop every job record of a thread. A job that is still rendering
    /// discards its outputs when it finishes.
    pub fn purge_thread(&self, thread_id: &str) -> usize {
        let mut jobs = self.inner.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, j| j.thread_id != thread_id);
        let removed = before - jobs.len();

        if removed > 0 {
            tracing::debug!(thread_id = %thread_id, removed = removed, "Purged export jobs");
        }
        removed
    }

    /// Stop the worker after its current job and wait for it to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
        let working = self.working_count();
        if working > 0 {
            tracing::info!(working = working, "Waiting for running export to finish");
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Export worker ended abnormally");
            }
        }
    }
}

impl Drop for ExportQueue {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }
}

async fn run_worker(inner: Arc<QueueInner>) {
    tracing::debug!(poll_interval = ?inner.poll_interval, "Export worker started");

    while !inner.shutdown.load(Ordering::SeqCst) {
        let Some(job) = inner.claim_next() else {
            // Idle until the next poll, or until shutdown wakes us
            tokio::select! {
                () = tokio::time::sleep(inner.poll_interval) => {}
                () = inner.wake.notified() => {}
            }
            continue;
        };

        let render_inner = Arc::clone(&inner);
        let render_job = job.clone();
        let outcome = tokio::task::spawn_blocking(move || render_inner.process(&render_job))
            .await
            .unwrap_or_else(|e| {
                Err(AppError::Io {
                    message: format!("export task panicked: {e}"),
                    source: None,
                })
            });

        inner.finish(&job, outcome);
    }

    tracing::debug!("Export worker stopped");
}

impl QueueInner {
    /// Move the oldest pending job to `working`.
    fn claim_next(&self) -> Option<ExportJob> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .values_mut()
            .filter(|j| j.status == ExportStatus::Pending)
            .min_by(|a, b| a.created_at.cmp(&b.created_at))?;
        job.start();

        tracing::info!(job_id = %job.id, thread_id = %job.thread_id, "Export job claimed");
        Some(job.clone())
    }

    /// Render, package and optionally convert one job. Runs on the blocking pool.
    fn process(&self, job: &ExportJob) -> Result<PathBuf> {
        let job_dir = self.layout.job_dir(&job.thread_id, &job.id);
        fs::create_dir_all(&job_dir)
            .map_err(|e| AppError::io("Failed to create export directory", e))?;

        let thread = self
            .store
            .get_thread(&job.thread_id)?
            .ok_or_else(|| AppError::thread_not_found(&job.thread_id))?;

        let bundle = render_bundle(&thread, &job_dir)?;

        let zip_path = self.layout.job_artifact(&job.thread_id, &job.id, "zip");
        zip_directory(&job_dir, &zip_path)?;

        match job.format {
            ExportFormat::Md | ExportFormat::Zip => Ok(zip_path),
            ExportFormat::Pdf => {
                let pdf_path = self.layout.job_artifact(&job.thread_id, &job.id, "pdf");
                self.converters.convert(&PdfRequest {
                    markdown: &bundle.markdown_path,
                    pdf: &pdf_path,
                    workdir: &job_dir,
                })?;
                Ok(pdf_path)
            }
        }
    }

    /// Record the outcome, or clean up if the job was purged meanwhile.
    ///
    /// A job whose thread vanished also leaves nothing behind: the thread's
    /// delete cascade may already have run. Its outputs go before the job
    /// turns terminal.
    fn finish(&self, job: &ExportJob, outcome: Result<PathBuf>) {
        let thread_missing = matches!(&outcome, Err(e) if e.is_thread_not_found());
        if thread_missing {
            tracing::debug!(job_id = %job.id, thread_id = %job.thread_id, "Thread gone, discarding export outputs");
            self.discard_outputs(job);
        }

        let recorded = {
            let mut jobs = self.jobs.lock();
            match jobs.get_mut(&job.id) {
                Some(record) => {
                    match outcome {
                        Ok(path) => {
                            tracing::info!(job_id = %job.id, path = %path.display(), "Export job done");
                            record.complete(path);
                        }
                        Err(e) => {
                            tracing::warn!(job_id = %job.id, error = %e, "Export job failed");
                            record.fail(e.to_string());
                        }
                    }
                    true
                }
                None => false,
            }
        };

        if !recorded && !thread_missing {
            tracing::info!(job_id = %job.id, thread_id = %job.thread_id, "Export job purged while running, discarding outputs");
            self.discard_outputs(job);
        }
    }

    fn discard_outputs(&self, job: &ExportJob) {
        let layout = &self.layout;
        if let Err(e) = remove_dir_if_exists(&layout.job_dir(&job.thread_id, &job.id)) {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to remove export directory");
        }
        for ext in ["zip", "pdf"] {
            remove_file_if_exists(&layout.job_artifact(&job.thread_id, &job.id, ext));
        }
        // Only succeeds once no other job output is left.
        let _ = fs::remove_dir(layout.thread_exports_dir(&job.thread_id));
    }
}

fn remove_file_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove export artifact"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewMessage;
    use crate::infrastructure::converters::testing::FakeConverter;
    use crate::infrastructure::{PdfConverter, PdfRequest};
    use std::fs::File;
    use std::io::Read;
    use std::time::Instant;
    use tempfile::{tempdir, TempDir};

    const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    /// Converter that takes a while, so `working` is observable.
    struct SlowConverter(Duration);

    impl PdfConverter for SlowConverter {
        fn name(&self) -> &str {
            "slow"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn convert(&self, request: &PdfRequest<'_>) -> Result<()> {
            std::thread::sleep(self.0);
            fs::write(request.pdf, b"%PDF-1.4 slow\n").map_err(|e| AppError::io("slow write", e))
        }
    }

    struct Fixture {
        _dir: TempDir,
        layout: DataLayout,
        store: Arc<ThreadStore>,
        queue: ExportQueue,
    }

    fn fixture(converters: ConverterChain, poll: Duration) -> Fixture {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let store = Arc::new(ThreadStore::open(&layout.store_path()).unwrap());
        let queue = ExportQueue::start(layout.clone(), Arc::clone(&store), converters, poll);
        Fixture {
            _dir: dir,
            layout,
            store,
            queue,
        }
    }

    fn thread_with_messages(store: &ThreadStore) -> String {
        let thread = store.create_thread(Some("export-thread")).unwrap();
        store
            .add_message(&thread.id, NewMessage::text("user", "Hello"))
            .unwrap();
        store
            .add_message(
                &thread.id,
                NewMessage::image_base64("ai", "An image", format!("data:image/png;base64,{PNG_1X1}")),
            )
            .unwrap();
        thread.id
    }

    async fn wait_terminal(queue: &ExportQueue, job_id: &str) -> ExportJob {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let job = queue.status(job_id).unwrap();
            if job.status.is_terminal() {
                return job;
            }
            assert!(Instant::now() < deadline, "job {job_id} stuck in {}", job.status);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn wait_status(queue: &ExportQueue, job_id: &str, status: ExportStatus) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while queue.status(job_id).map(|j| j.status) != Some(status) {
            assert!(Instant::now() < deadline, "job {job_id} never reached {status}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_zip_export_round_trip() {
        let fx = fixture(ConverterChain::new(Vec::new()), Duration::from_millis(10));
        let thread_id = thread_with_messages(&fx.store);

        let job = fx.queue.enqueue(&thread_id, ExportFormat::Zip);
        assert_eq!(job.status, ExportStatus::Pending);

        let job = wait_terminal(&fx.queue, &job.id).await;
        assert_eq!(job.status, ExportStatus::Done, "error: {:?}", job.error);

        let zip_path = fx.queue.download(&job.id).unwrap();
        assert_eq!(zip_path, fx.layout.job_artifact(&thread_id, &job.id, "zip"));

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut md = String::new();
        archive
            .by_name("thread.md")
            .unwrap()
            .read_to_string(&mut md)
            .unwrap();
        assert!(md.contains("Hello"));

        let images: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("images/"))
            .map(String::from)
            .collect();
        assert_eq!(images.len(), 1);
        assert!(md.contains(&format!("]({})", images[0])));
    }

    #[tokio::test]
    async fn test_md_format_delivers_bundle_zip() {
        let fx = fixture(ConverterChain::new(Vec::new()), Duration::from_millis(10));
        let thread_id = thread_with_messages(&fx.store);

        let job = fx.queue.enqueue(&thread_id, ExportFormat::Md);
        let job = wait_terminal(&fx.queue, &job.id).await;

        assert_eq!(job.status, ExportStatus::Done);
        assert_eq!(job.result_path.unwrap().extension().unwrap(), "zip");
    }

    #[tokio::test]
    async fn test_pdf_without_converter_fails() {
        let fx = fixture(ConverterChain::new(Vec::new()), Duration::from_millis(10));
        let thread_id = thread_with_messages(&fx.store);

        let job = fx.queue.enqueue(&thread_id, ExportFormat::Pdf);
        let job = wait_terminal(&fx.queue, &job.id).await;

        assert_eq!(job.status, ExportStatus::Failed);
        assert!(job.result_path.is_none());
        assert!(job
            .error
            .as_deref()
            .unwrap()
            .contains("No PDF converter available"));
        assert!(matches!(
            fx.queue.download(&job.id),
            Err(AppError::Conflict {
                status: ExportStatus::Failed
            })
        ));
        // Baseline zip and working dir stay for diagnosis
        assert!(fx.layout.job_artifact(&thread_id, &job.id, "zip").exists());
        assert!(fx.layout.job_dir(&thread_id, &job.id).exists());
    }

    #[tokio::test]
    async fn test_pdf_with_unavailable_converters_fails() {
        let (missing, _) = FakeConverter::boxed("pandoc", false, true);
        let (broken, _) = FakeConverter::boxed("weasyprint", true, false);
        let fx = fixture(ConverterChain::new(vec![missing, broken]), Duration::from_millis(10));
        let thread_id = thread_with_messages(&fx.store);

        let job = fx.queue.enqueue(&thread_id, ExportFormat::Pdf);
        let job = wait_terminal(&fx.queue, &job.id).await;

        assert_eq!(job.status, ExportStatus::Failed);
        let error = job.error.unwrap();
        assert!(error.contains("No PDF converter available"));
        assert!(error.contains("pandoc: not installed"));
    }

    #[tokio::test]
    async fn test_pdf_supersedes_zip() {
        let (broken, _) = FakeConverter::boxed("first", true, false);
        let (working, calls) = FakeConverter::boxed("second", true, true);
        let fx = fixture(ConverterChain::new(vec![broken, working]), Duration::from_millis(10));
        let thread_id = thread_with_messages(&fx.store);

        let job = fx.queue.enqueue(&thread_id, ExportFormat::Pdf);
        let job = wait_terminal(&fx.queue, &job.id).await;

        assert_eq!(job.status, ExportStatus::Done, "error: {:?}", job.error);
        let pdf = fx.queue.download(&job.id).unwrap();
        assert_eq!(pdf.extension().unwrap(), "pdf");
        assert!(pdf.exists());
        assert!(fx.layout.job_artifact(&thread_id, &job.id, "zip").exists());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_thread_fails_job() {
        let fx = fixture(ConverterChain::new(Vec::new()), Duration::from_millis(10));

        let job = fx.queue.enqueue("no-such-thread", ExportFormat::Zip);
        let job = wait_terminal(&fx.queue, &job.id).await;

        assert_eq!(job.status, ExportStatus::Failed);
        assert!(job.error.unwrap().contains("not found"));
        // Nothing is left under a thread that has no cascade to clean it up
        assert!(!fx.layout.job_dir("no-such-thread", &job.id).exists());
        assert!(!fx.layout.thread_exports_dir("no-such-thread").exists());
    }

    #[tokio::test]
    async fn test_download_unknown_job() {
        let fx = fixture(ConverterChain::new(Vec::new()), Duration::from_millis(10));
        assert!(fx.queue.download("nope").unwrap_err().is_not_found());
        assert!(fx.queue.status("nope").is_none());
    }

    #[tokio::test]
    async fn test_download_while_pending_is_conflict() {
        // Long poll interval: the worker is asleep when the job arrives
        let fx = fixture(ConverterChain::new(Vec::new()), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let thread_id = thread_with_messages(&fx.store);

        let job = fx.queue.enqueue(&thread_id, ExportFormat::Zip);
        assert!(matches!(
            fx.queue.download(&job.id),
            Err(AppError::Conflict {
                status: ExportStatus::Pending
            })
        ));
    }

    #[tokio::test]
    async fn test_download_while_working_is_conflict() {
        let slow: Box<dyn PdfConverter> = Box::new(SlowConverter(Duration::from_millis(400)));
        let fx = fixture(ConverterChain::new(vec![slow]), Duration::from_millis(10));
        let thread_id = thread_with_messages(&fx.store);

        let job = fx.queue.enqueue(&thread_id, ExportFormat::Pdf);
        wait_status(&fx.queue, &job.id, ExportStatus::Working).await;
        assert!(matches!(
            fx.queue.download(&job.id),
            Err(AppError::Conflict {
                status: ExportStatus::Working
            })
        ));

        let job = wait_terminal(&fx.queue, &job.id).await;
        assert_eq!(job.status, ExportStatus::Done);
        assert!(fx.queue.download(&job.id).is_ok());
    }

    #[tokio::test]
    async fn test_at_most_one_job_working() {
        let slow: Box<dyn PdfConverter> = Box::new(SlowConverter(Duration::from_millis(60)));
        let fx = fixture(ConverterChain::new(vec![slow]), Duration::from_millis(5));
        let thread_id = thread_with_messages(&fx.store);

        let ids: Vec<String> = (0..4)
            .map(|_| fx.queue.enqueue(&thread_id, ExportFormat::Pdf).id)
            .collect();

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            assert!(fx.queue.working_count() <= 1);
            let all_done = ids
                .iter()
                .all(|id| fx.queue.status(id).unwrap().status.is_terminal());
            if all_done {
                break;
            }
            assert!(Instant::now() < deadline, "jobs did not finish");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        for id in &ids {
            assert_eq!(fx.queue.status(id).unwrap().status, ExportStatus::Done);
        }
    }

    #[tokio::test]
    async fn test_purge_while_working_discards_outputs() {
        let slow: Box<dyn PdfConverter> = Box::new(SlowConverter(Duration::from_millis(200)));
        let fx = fixture(ConverterChain::new(vec![slow]), Duration::from_millis(10));
        let thread_id = thread_with_messages(&fx.store);

        let job = fx.queue.enqueue(&thread_id, ExportFormat::Pdf);
        wait_status(&fx.queue, &job.id, ExportStatus::Working).await;

        let job_dir = fx.layout.job_dir(&thread_id, &job.id);
        let zip = fx.layout.job_artifact(&thread_id, &job.id, "zip");
        let pdf = fx.layout.job_artifact(&thread_id, &job.id, "pdf");
        let exports_dir = fx.layout.thread_exports_dir(&thread_id);

        // The zip is written before the converter starts its sleep
        let deadline = Instant::now() + Duration::from_secs(10);
        while !zip.exists() {
            assert!(Instant::now() < deadline, "bundle was never written");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(job_dir.join("thread.md").exists());

        assert_eq!(fx.queue.purge_thread(&thread_id), 1);
        assert!(fx.queue.status(&job.id).is_none());

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !job_dir.exists() && !zip.exists() && !pdf.exists() && !exports_dir.exists() {
                break;
            }
            assert!(Instant::now() < deadline, "purged job outputs were not discarded");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pdf_export_with_relative_data_dir() {
        use crate::infrastructure::converters::HtmlPdfConverter;

        // `sh -c 'cp "$1" "$2"' sh <html> <pdf>` stands in for weasyprint
        let copy: Box<dyn PdfConverter> = Box::new(HtmlPdfConverter::new(
            "sh",
            vec!["-c".into(), r#"cp "$1" "$2""#.into(), "sh".into()],
        ));

        let dir = tempfile::Builder::new()
            .prefix("relative-archive")
            .tempdir_in(".")
            .unwrap();
        assert!(dir.path().is_relative());

        let layout = DataLayout::new(dir.path());
        let store = Arc::new(ThreadStore::open(&layout.store_path()).unwrap());
        let queue = ExportQueue::start(
            layout.clone(),
            Arc::clone(&store),
            ConverterChain::new(vec![copy]),
            Duration::from_millis(10),
        );
        let thread_id = thread_with_messages(&store);

        let job = queue.enqueue(&thread_id, ExportFormat::Pdf);
        let job = wait_terminal(&queue, &job.id).await;

        assert_eq!(job.status, ExportStatus::Done, "error: {:?}", job.error);
        let pdf = queue.download(&job.id).unwrap();
        assert!(pdf.is_absolute());
        assert!(fs::read_to_string(pdf).unwrap().contains("Hello"));

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker() {
        let fx = fixture(ConverterChain::new(Vec::new()), Duration::from_millis(10));
        fx.queue.shutdown().await;

        let thread_id = thread_with_messages(&fx.store);
        let job = fx.queue.enqueue(&thread_id, ExportFormat::Zip);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.queue.status(&job.id).unwrap().status, ExportStatus::Pending);
    }
}
