//! Parallel batch HTTP(S) download with all-or-nothing semantics: the first failing
//! task cancels the whole batch.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use std::io;

use sha1::{Digest, Sha1};

use reqwest::Client;

use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use tracing::{debug, trace, warn};


/// Default timeout applied to both the connection and the whole request of each task.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// A file to download to a destination, with an optional expected SHA-1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Url of the file to download, supporting only HTTP/HTTPS protocols.
    pub url: String,
    /// Path to the file to ultimately download.
    pub file: PathBuf,
    /// Expected SHA-1 of the file, a destination without expected SHA-1 is considered
    /// valid as soon as it exists.
    pub sha1: Option<[u8; 20]>,
}

impl Task {

    #[inline]
    pub fn new(url: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            file: file.into(),
            sha1: None,
        }
    }

    #[inline]
    pub fn with_sha1(mut self, sha1: Option<[u8; 20]>) -> Self {
        self.sha1 = sha1;
        self
    }

}

/// Progress counters of a batch, owned by the caller and readable from any thread
/// while the batch is downloading.
#[derive(Debug, Default)]
pub struct TaskProgress {
    inner: Mutex<ProgressCounters>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ProgressCounters {
    completed: usize,
    total: usize,
}

impl TaskProgress {

    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks completed so far.
    pub fn completed(&self) -> usize {
        self.lock().completed
    }

    /// Number of tasks in the batch.
    pub fn total(&self) -> usize {
        self.lock().total
    }

    /// Both completed and total tasks count, read atomically.
    pub fn get(&self) -> (usize, usize) {
        let counters = self.lock();
        (counters.completed, counters.total)
    }

    fn reset(&self, total: usize) {
        *self.lock() = ProgressCounters { completed: 0, total };
    }

    fn increment(&self) {
        self.lock().completed += 1;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressCounters> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

}

/// A handle notified of the outcome of a batch, exactly one of the two methods is
/// called once per download.
pub trait Handler {

    /// All tasks of the batch are downloaded and verified.
    fn on_success(&mut self) {}

    /// The batch has been cancelled because of the given error.
    fn on_failure(&mut self, error: &Error) {
        let _ = error;
    }

}

/// Blanket implementation if no handler is needed.
impl Handler for () { }

impl<H: Handler + ?Sized> Handler for &'_ mut H {

    fn on_success(&mut self) {
        (**self).on_success()
    }

    fn on_failure(&mut self, error: &Error) {
        (**self).on_failure(error)
    }

}

/// A list of pending tasks that are all downloaded at once.
#[derive(Debug)]
pub struct Batch {
    tasks: Vec<Task>,
    concurrency: Option<usize>,
    timeout: Duration,
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl Batch {

    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            concurrency: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Push a single task to the batch.
    #[inline]
    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    #[inline]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Maximum number of tasks downloading at the same time, none to download all
    /// tasks at once.
    #[inline]
    pub fn concurrency(&self) -> Option<usize> {
        self.concurrency
    }

    /// See [`Self::concurrency`].
    #[inline]
    pub fn set_concurrency(&mut self, concurrency: Option<usize>) -> &mut Self {
        self.concurrency = concurrency;
        self
    }

    /// Timeout of each task, applied to both the connection and the whole request.
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// See [`Self::timeout`].
    #[inline]
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Block while downloading all tasks of the batch. The progress is reset to zero
    /// completed tasks at start, and the handler is notified of the outcome which is
    /// also returned.
    pub fn download(self, progress: &TaskProgress, mut handler: impl Handler) -> Result<()> {

        progress.reset(self.tasks.len());

        let concurrency = self.concurrency
            .unwrap_or(self.tasks.len())
            .max(1);

        debug!(count = self.tasks.len(), concurrency, "downloading batch");

        let result = crate::tokio::sync(download_impl(self.tasks, concurrency, self.timeout, progress))
            .map_err(Error::Runtime)
            .and_then(|result| result);

        match &result {
            Ok(()) => handler.on_success(),
            Err(e) => {
                warn!(error = %e, "batch download failed");
                handler.on_failure(e);
            }
        }

        result

    }

}

/// The error type of a batch download, the first error that cancelled the batch.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The runtime could not be created.
    #[error("runtime: {0}")]
    Runtime(#[source] io::Error),
    /// The HTTP client could not be created, before downloading any task.
    #[error("client: {0}")]
    Client(#[source] reqwest::Error),
    /// HTTP error while downloading a task.
    #[error("reqwest: {source} @ {url}")]
    Reqwest {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Non-successful HTTP status code while requesting a task.
    #[error("invalid status {status} @ {url}")]
    InvalidStatus {
        url: String,
        status: u16,
    },
    /// The downloaded file doesn't match the task's expected SHA-1.
    #[error("invalid sha1 hash: {}", file.display())]
    InvalidShaHash {
        file: PathBuf,
    },
    /// System I/O error while writing or moving a downloaded file.
    #[error("io: {source} @ {}", file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Type alias for a result of batch download.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {

    #[inline]
    fn new_io(source: io::Error, file: &Path) -> Self {
        Self::Io { file: file.to_path_buf(), source }
    }

    #[inline]
    fn new_reqwest(source: reqwest::Error, url: &str) -> Self {
        Self::Reqwest { url: url.to_string(), source }
    }

}

/// Bulk download async entrypoint.
async fn download_impl(
    tasks: Vec<Task>,
    concurrency: usize,
    timeout: Duration,
    progress: &TaskProgress,
) -> Result<()> {

    if tasks.is_empty() {
        return Ok(());
    }

    let client = crate::http::client(Some(timeout)).map_err(Error::Client)?;

    let tasks = Arc::new(tasks);
    let client = Arc::new(client);
    let cancel = CancellationToken::new();

    let mut futures = JoinSet::new();
    let mut index = 0;

    while futures.len() < concurrency && index < tasks.len() {
        futures.spawn(download_task_wrapper(Arc::clone(&client), Arc::clone(&tasks), index, cancel.clone()));
        index += 1;
    }

    // Only this loop writes the progress, each task reporting its outcome on join.
    while let Some(joined) = futures.join_next().await {

        let outcome = match joined {
            Ok(Some(outcome)) => outcome,
            Ok(None) => continue,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => continue,
        };

        if let Err(e) = outcome {

            cancel.cancel();
            futures.abort_all();
            // Wait for aborted tasks to drop their temporary files.
            while futures.join_next().await.is_some() { }

            return Err(e);

        }

        progress.increment();

        if index < tasks.len() {
            futures.spawn(download_task_wrapper(Arc::clone(&client), Arc::clone(&tasks), index, cancel.clone()));
            index += 1;
        }

    }

    Ok(())

}

/// Run a task until it completes or the batch is cancelled, returning none if
/// cancelled.
async fn download_task_wrapper(
    client: Arc<Client>,
    tasks: Arc<Vec<Task>>,
    index: usize,
    cancel: CancellationToken,
) -> Option<Result<()>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = download_task(&client, &tasks[index], &cancel) => Some(result),
    }
}

/// Internal function to download a single task.
async fn download_task(client: &Client, task: &Task, cancel: &CancellationToken) -> Result<()> {

    if check_file(&task.file, task.sha1.as_ref()).await.map_err(|e| Error::new_io(e, &task.file))? {
        trace!(file = %task.file.display(), "file already valid");
        return Ok(());
    }

    let parent = task.file.parent().unwrap_or(Path::new("."));

    // Missing directories are only created once the file is verified, the temporary
    // file is removed when dropped, including when the task is aborted.
    let tmp_dir = existing_ancestor(parent).await;
    let tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".part")
        .tempfile_in(tmp_dir)
        .map_err(|e| Error::new_io(e, tmp_dir))?;

    let mut res = client.get(&task.url)
        .send().await
        .map_err(|e| Error::new_reqwest(e, &task.url))?;

    if !res.status().is_success() {
        return Err(Error::InvalidStatus {
            url: task.url.clone(),
            status: res.status().as_u16(),
        });
    }

    let mut dst = tmp.reopen()
        .map(tokio::fs::File::from_std)
        .map_err(|e| Error::new_io(e, tmp.path()))?;

    let mut sha1 = Sha1::new();

    while let Some(chunk) = res.chunk().await.map_err(|e| Error::new_reqwest(e, &task.url))? {
        dst.write_all(&chunk).await.map_err(|e| Error::new_io(e, tmp.path()))?;
        sha1.update(&chunk);
    }

    dst.flush().await.map_err(|e| Error::new_io(e, tmp.path()))?;
    drop(dst);

    if cancel.is_cancelled() {
        return Ok(());
    }

    // Another process may have written the destination meanwhile.
    if check_file(&task.file, task.sha1.as_ref()).await.map_err(|e| Error::new_io(e, &task.file))? {
        trace!(file = %task.file.display(), "file became valid while downloading");
        return Ok(());
    }

    match tokio::fs::remove_file(&task.file).await {
        Ok(()) => debug!(file = %task.file.display(), "removed invalid file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::new_io(e, &task.file)),
    }

    if let Some(expected) = &task.sha1 {
        if sha1.finalize().as_slice() != &expected[..] {
            return Err(Error::InvalidShaHash { file: task.file.clone() });
        }
    }

    tokio::fs::create_dir_all(parent).await
        .map_err(|e| Error::new_io(e, parent))?;

    tmp.persist(&task.file)
        .map_err(|e| Error::new_io(e.error, &task.file))?;

    trace!(file = %task.file.display(), url = %task.url, "downloaded file");
    Ok(())

}

/// Return the closest directory among the given one and its ancestors that exists.
async fn existing_ancestor(dir: &Path) -> &Path {
    for ancestor in dir.ancestors() {
        let ancestor = if ancestor.as_os_str().is_empty() { Path::new(".") } else { ancestor };
        if tokio::fs::metadata(ancestor).await.is_ok_and(|meta| meta.is_dir()) {
            return ancestor;
        }
    }
    Path::new(".")
}

/// Return true if the file exists and, if an expected SHA-1 is given, matches it.
async fn check_file(file: &Path, sha1: Option<&[u8; 20]>) -> io::Result<bool> {

    let reader = match tokio::fs::File::open(file).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let Some(expected) = sha1 else {
        return Ok(true);
    };

    let mut digest = Sha1::new();
    io::copy(&mut reader.into_std().await, &mut digest)?;
    Ok(digest.finalize().as_slice() == &expected[..])

}
