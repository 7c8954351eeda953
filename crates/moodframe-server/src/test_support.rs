//! Counting stand-ins for the vendor adapters plus an in-memory bucket.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use image::{ImageFormat, Rgba, RgbaImage};
use moodframe_engine::storage::memory::MemoryObjectStore;
use moodframe_engine::{
    EmotionTagSet, EmotionTagger, Error, GeneratedImage, ImageSource, ImageTransformer,
    ImageVariator, Result,
};

use crate::api_server::router;
use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::handlers::AppState;
use crate::reporting::recording::RecordingReporter;

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 120, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}

#[derive(Debug, Clone)]
pub enum StubResult {
    Image(GeneratedImage),
    NoImage,
    Failure(&'static str),
}

impl StubResult {
    fn resolve(&self, provider: &str) -> Result<GeneratedImage> {
        match self {
            Self::Image(image) => Ok(image.clone()),
            Self::NoImage => Err(Error::no_image(provider)),
            Self::Failure(message) => Err(Error::vendor(provider, *message)),
        }
    }
}

pub struct StubTransformer {
    result: StubResult,
    calls: AtomicUsize,
    last: Mutex<Option<ImageSource>>,
}

impl StubTransformer {
    fn new(result: StubResult) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_source(&self) -> Option<ImageSource> {
        self.last.lock().expect("stub lock").clone()
    }
}

#[async_trait]
impl ImageTransformer for StubTransformer {
    fn name(&self) -> &str {
        "stub"
    }

    async fn transform(&self, source: &ImageSource) -> Result<GeneratedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().expect("stub lock") = Some(source.clone());
        self.result.resolve("Stub")
    }
}

pub struct StubVariator {
    result: StubResult,
    calls: AtomicUsize,
    last: Mutex<Option<Vec<u8>>>,
}

impl StubVariator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<Vec<u8>> {
        self.last.lock().expect("stub lock").clone()
    }
}

#[async_trait]
impl ImageVariator for StubVariator {
    fn name(&self) -> &str {
        "stub"
    }

    async fn vary(&self, png: Vec<u8>) -> Result<GeneratedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().expect("stub lock") = Some(png);
        self.result.resolve("Stub")
    }
}

/// Applies the real completion filter to a canned completion.
pub struct StubTagger {
    completion: std::result::Result<&'static str, &'static str>,
    calls: AtomicUsize,
    last: Mutex<Option<String>>,
}

impl StubTagger {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_text(&self) -> Option<String> {
        self.last.lock().expect("stub lock").clone()
    }
}

#[async_trait]
impl EmotionTagger for StubTagger {
    fn name(&self) -> &str {
        "stub"
    }

    async fn tag(&self, transcript: &str) -> Result<EmotionTagSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().expect("stub lock") = Some(transcript.to_string());
        match self.completion {
            Ok(raw) => Ok(EmotionTagSet::from_completion(raw)),
            Err(message) => Err(Error::vendor("Stub", message)),
        }
    }
}

pub struct Harness {
    pub server: TestServer,
    pub store: Arc<MemoryObjectStore>,
    pub inline: Arc<StubTransformer>,
    pub url: Arc<StubTransformer>,
    pub variator: Arc<StubVariator>,
    pub tagger: Arc<StubTagger>,
    pub reporter: Arc<RecordingReporter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            inline: StubResult::Image(GeneratedImage::png(vec![1, 2, 3])),
            url: StubResult::Image(GeneratedImage::png(vec![4, 5, 6])),
            variator: StubResult::Image(GeneratedImage::png(vec![7, 8, 9])),
            tagger: Ok("기쁨"),
            failing_store: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

pub struct HarnessBuilder {
    inline: StubResult,
    url: StubResult,
    variator: StubResult,
    tagger: std::result::Result<&'static str, &'static str>,
    failing_store: bool,
    max_body_bytes: usize,
}

impl HarnessBuilder {
    pub fn inline(mut self, result: StubResult) -> Self {
        self.inline = result;
        self
    }

    pub fn url(mut self, result: StubResult) -> Self {
        self.url = result;
        self
    }

    pub fn variator(mut self, result: StubResult) -> Self {
        self.variator = result;
        self
    }

    pub fn tags(mut self, completion: &'static str) -> Self {
        self.tagger = Ok(completion);
        self
    }

    pub fn tagger_failure(mut self, message: &'static str) -> Self {
        self.tagger = Err(message);
        self
    }

    pub fn failing_store(mut self) -> Self {
        self.failing_store = true;
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(if self.failing_store {
            MemoryObjectStore::failing()
        } else {
            MemoryObjectStore::new()
        });
        let inline = Arc::new(StubTransformer::new(self.inline));
        let url = Arc::new(StubTransformer::new(self.url));
        let variator = Arc::new(StubVariator {
            result: self.variator,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        });
        let tagger = Arc::new(StubTagger {
            completion: self.tagger,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        });
        let reporter = Arc::new(RecordingReporter::default());

        let state = Arc::new(AppState {
            store: store.clone(),
            inline_transformer: inline.clone(),
            url_transformer: url.clone(),
            variator: variator.clone(),
            tagger: tagger.clone(),
            reporter: reporter.clone(),
        });
        let server = TestServer::new(router(state, self.max_body_bytes)).expect("test server");

        Harness {
            server,
            store,
            inline,
            url,
            variator,
            tagger,
            reporter,
        }
    }
}
