//! Build and stage contexts handed to transformers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::cancel::Cancellation;
use super::error::TransformError;
use crate::format::Formats;
use crate::logger::Logger;
use crate::page::Page;
use crate::reader::{Fetch, Reader};
use crate::resolve::{IncludeResolver, Location, ResolveError};
use crate::sourcemap::Composer;

/// Everything shared by the stages of one build.
#[derive(Debug)]
pub struct BuildContext {
    pub root: PathBuf,
    pub formats: Arc<Formats>,
    pub resolver: IncludeResolver,
    pub reader: Reader,
    pub composer: Composer,
    pub logger: Logger,
    pub cancel: Cancellation,
}

impl BuildContext {
    /// `includes` are root-relative include directories, searched in order.
    pub fn new(
        root: impl Into<PathBuf>,
        formats: Arc<Formats>,
        includes: Vec<PathBuf>,
        fetcher: Arc<dyn Fetch>,
        logger: Logger,
    ) -> Self {
        let root = root.into();
        Self {
            resolver: IncludeResolver::new(includes, formats.clone()),
            reader: Reader::new(root.clone(), fetcher),
            composer: Composer::new(root.clone()),
            formats,
            logger,
            cancel: Cancellation::new(),
            root,
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Per-stage view of the build, shared by the invocations of that stage.
#[derive(Debug)]
pub struct StageContext {
    build: Arc<BuildContext>,
    stage: String,
    emitted: Mutex<Vec<Page>>,
}

impl StageContext {
    pub(crate) fn new(build: Arc<BuildContext>, stage: impl Into<String>) -> Self {
        Self {
            build,
            stage: stage.into(),
            emitted: Mutex::new(Vec::new()),
        }
    }

    /// Name of the running stage.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn build(&self) -> &BuildContext {
        &self.build
    }

    pub fn root(&self) -> &Path {
        &self.build.root
    }

    pub fn resolver(&self) -> &IncludeResolver {
        &self.build.resolver
    }

    pub fn reader(&self) -> &Reader {
        &self.build.reader
    }

    pub fn logger(&self) -> &Logger {
        &self.build.logger
    }

    /// Resolve `specifier` from the root-relative directory `from_dir`,
    /// checking candidates through the build reader.
    pub async fn locate(&self, specifier: &str, from_dir: &Path) -> Result<Location, ResolveError> {
        self.resolver()
            .resolve_include(self.reader(), specifier, from_dir)
            .await
    }

    /// Resolve `specifier` from `from_dir` and read it as text.
    pub async fn include(
        &self,
        specifier: &str,
        from_dir: &Path,
    ) -> Result<(Location, String), TransformError> {
        let location = self.locate(specifier, from_dir).await?;
        let text = self.reader().read_text(&location).await?;
        Ok((location, text))
    }

    /// Add a new page to the build.
    ///
    /// Emitted pages join the page list when the stage finishes and are only
    /// seen by later stages.
    pub fn emit(&self, page: Page) {
        self.emitted.lock().push(page);
    }

    pub(crate) fn take_emitted(&self) -> Vec<Page> {
        std::mem::take(&mut *self.emitted.lock())
    }
}
