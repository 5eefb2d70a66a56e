use std::sync::Arc;

use crate::blobstore::BlobStore;
use crate::clients::fusion::FusionApi;
use crate::clients::tts::TtsApi;
use crate::config::AppConfig;
use crate::stitcher::VideoConcat;
use crate::store::SegmentStore;

/// Everything a component needs, constructed once at startup and passed
/// explicitly. No global mutable state; scoped lifetimes release pools and
/// clients on shutdown.
#[derive(Clone)]
pub struct CoreContext {
    pub config: AppConfig,
    pub store: SegmentStore,
    pub tts: Arc<dyn TtsApi>,
    pub fusion: Arc<dyn FusionApi>,
    pub blobs: Arc<dyn BlobStore>,
    pub concat: Arc<dyn VideoConcat>,
}
