//! Closure-built jobs.
//!
//! ```ignore
//! let job = ChainJob::new()
//!     .tag("thumbnails")
//!     .background(|paths: Vec<PathBuf>, ctx| render(paths, ctx))
//!     .success(|images| show(images));
//! ```

use super::{Job, WorkerContext};

type Background<P, G, R> = Box<dyn Fn(Vec<P>, &WorkerContext<'_, G>) -> eyre::Result<R> + Send + Sync>;

/// A [`Job`] assembled from optional closures.
///
/// Without a `tag` the task bypasses lanes. Without a `background` step the
/// task fails and finishes cancelled.
pub struct ChainJob<P, G, R> {
    tag: Option<String>,
    setup: Option<Box<dyn Fn() + Send + Sync>>,
    background: Option<Background<P, G, R>>,
    progress: Option<Box<dyn Fn(Vec<G>) + Send + Sync>>,
    success: Option<Box<dyn Fn(&R) + Send + Sync>>,
    cancelled_with: Option<Box<dyn Fn(Option<&R>) + Send + Sync>>,
    cancelled: Option<Box<dyn Fn() + Send + Sync>>,
}

impl<P, G, R> Default for ChainJob<P, G, R> {
    fn default() -> Self {
        Self {
            tag: None,
            setup: None,
            background: None,
            progress: None,
            success: None,
            cancelled_with: None,
            cancelled: None,
        }
    }
}

impl<P, G, R> ChainJob<P, G, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn setup(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.setup = Some(Box::new(f));
        self
    }

    pub fn background<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<P>, &WorkerContext<'_, G>) -> eyre::Result<R> + Send + Sync + 'static,
    {
        self.background = Some(Box::new(f));
        self
    }

    pub fn progress(mut self, f: impl Fn(Vec<G>) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn success(mut self, f: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    /// Replaces `cancelled` when both are set.
    pub fn cancelled_with(mut self, f: impl Fn(Option<&R>) + Send + Sync + 'static) -> Self {
        self.cancelled_with = Some(Box::new(f));
        self
    }

    pub fn cancelled(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.cancelled = Some(Box::new(f));
        self
    }
}

impl<P, G, R> Job for ChainJob<P, G, R>
where
    P: Send + 'static,
    G: Send + 'static,
    R: Send + Sync + 'static,
{
    type Params = P;
    type Progress = G;
    type Output = R;

    fn tag(&self) -> String {
        self.tag.clone().unwrap_or_default()
    }

    fn on_setup(&self) {
        if let Some(f) = &self.setup {
            f();
        }
    }

    fn background(&self, params: Vec<P>, ctx: &WorkerContext<'_, G>) -> eyre::Result<R> {
        match &self.background {
            Some(f) => f(params, ctx),
            None => eyre::bail!("chain job has no background step"),
        }
    }

    fn on_progress(&self, values: Vec<G>) {
        if let Some(f) = &self.progress {
            f(values);
        }
    }

    fn on_success(&self, output: &R) {
        if let Some(f) = &self.success {
            f(output);
        }
    }

    fn on_cancelled_with(&self, output: Option<&R>) {
        match &self.cancelled_with {
            Some(f) => f(output),
            None => self.on_cancelled(),
        }
    }

    fn on_cancelled(&self) {
        if let Some(f) = &self.cancelled {
            f();
        }
    }
}
