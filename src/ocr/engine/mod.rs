mod parse;
mod raster;
mod tesseract;

use anyhow::Result;
use futures_util::stream::{self, StreamExt};
use image::GenericImageView;
use std::sync::Arc;

use crate::error::EngineError;
use crate::ocr::{BBoxPx, OcrToken, SegmentOptions, TextSection, segment_tokens};

pub use raster::CommandRasterizer;
pub use tesseract::{Tesseract, list_tesseract_languages};

/// A word reported by a [`Recognizer`], in pixel space of the image it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedWord {
    pub text: String,
    pub bbox: BBoxPx,
    pub confidence: f32,
}

/// Renders one page of a source document to a PNG image.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, source: &[u8], page: usize, dpi: u32) -> Result<Vec<u8>>;
}

/// Recognizes words in a PNG image rendered at `dpi`.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, image_png: &[u8], dpi: u32) -> Result<Vec<RecognizedWord>>;
}

/// Rasterize + recognize + segment, with pages spread over a bounded worker pool.
#[derive(Clone)]
pub struct OcrPipeline {
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn Recognizer>,
    dpi: u32,
    workers: usize,
    segment: SegmentOptions,
}

impl OcrPipeline {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        recognizer: Arc<dyn Recognizer>,
        dpi: u32,
        workers: usize,
        segment: SegmentOptions,
    ) -> Self {
        Self {
            rasterizer,
            recognizer,
            dpi: dpi.max(1),
            workers: workers.max(1),
            segment,
        }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub async fn recognize_tokens(
        &self,
        source: Arc<[u8]>,
        page_count: usize,
    ) -> Result<Vec<OcrToken>, EngineError> {
        let results = stream::iter(0..page_count)
            .map(|page| {
                let rasterizer = self.rasterizer.clone();
                let recognizer = self.recognizer.clone();
                let source = source.clone();
                let dpi = self.dpi;
                async move {
                    let joined = tokio::task::spawn_blocking(move || {
                        recognize_page(rasterizer.as_ref(), recognizer.as_ref(), &source, page, dpi)
                    })
                    .await;
                    let outcome = match joined {
                        Ok(outcome) => outcome,
                        Err(err) => Err(EngineError::Recognition(format!(
                            "ocr task for page {} failed: {}",
                            page, err
                        ))),
                    };
                    (page, outcome)
                }
            })
            .buffered(self.workers)
            .collect::<Vec<_>>()
            .await;

        let mut pages = Vec::with_capacity(results.len());
        for (page, outcome) in results {
            pages.push((page, outcome?));
        }
        pages.sort_by_key(|(page, _)| *page);

        Ok(pages
            .into_iter()
            .flat_map(|(page, words)| {
                words.into_iter().map(move |word| OcrToken {
                    text: word.text,
                    bbox: word.bbox,
                    conf: word.confidence,
                    page,
                })
            })
            .collect())
    }

    pub async fn extract_sections(
        &self,
        source: Arc<[u8]>,
        page_count: usize,
    ) -> Result<Vec<TextSection>, EngineError> {
        let tokens = self.recognize_tokens(source, page_count).await?;
        let sections = segment_tokens(&tokens, self.segment);
        tracing::info!(
            pages = page_count,
            tokens = tokens.len(),
            sections = sections.len(),
            "ocr completed"
        );
        Ok(sections)
    }
}

fn recognize_page(
    rasterizer: &dyn Rasterizer,
    recognizer: &dyn Recognizer,
    source: &[u8],
    page: usize,
    dpi: u32,
) -> Result<Vec<RecognizedWord>, EngineError> {
    let png = rasterizer
        .rasterize(source, page, dpi)
        .map_err(|err| EngineError::Rasterization(format!("page {}: {:#}", page, err)))?;
    let (width, height) = image::load_from_memory(&png)
        .map(|img| img.dimensions())
        .map_err(|err| EngineError::Rasterization(format!("page {}: {}", page, err)))?;
    tracing::debug!(page, width, height, dpi, "page rasterized");
    recognizer
        .recognize(&png, dpi)
        .map_err(|err| EngineError::Recognition(format!("page {}: {:#}", page, err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    struct BlankRasterizer;

    impl Rasterizer for BlankRasterizer {
        fn rasterize(&self, _source: &[u8], page: usize, _dpi: u32) -> Result<Vec<u8>> {
            // earlier pages finish last so completion order differs from page order
            std::thread::sleep(Duration::from_millis(30 * (3 - page as u64)));
            let img = image::RgbImage::new(4, 4);
            let mut out = Cursor::new(Vec::new());
            img.write_to(&mut out, image::ImageFormat::Png)?;
            Ok(out.into_inner())
        }
    }

    struct PageTagRecognizer {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl Recognizer for PageTagRecognizer {
        fn recognize(&self, _image_png: &[u8], _dpi: u32) -> Result<Vec<RecognizedWord>> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![RecognizedWord {
                text: format!("word{}", n),
                bbox: BBoxPx { x: 0, y: 0, w: 10, h: 10 },
                confidence: 90.0,
            }])
        }
    }

    struct FailingRasterizer;

    impl Rasterizer for FailingRasterizer {
        fn rasterize(&self, _source: &[u8], _page: usize, _dpi: u32) -> Result<Vec<u8>> {
            Err(anyhow::anyhow!("renderer missing"))
        }
    }

    #[tokio::test]
    async fn tokens_are_restored_to_page_order() {
        let pipeline = OcrPipeline::new(
            Arc::new(BlankRasterizer),
            Arc::new(PageTagRecognizer {
                calls: Default::default(),
            }),
            200,
            3,
            SegmentOptions::default(),
        );
        let source: Arc<[u8]> = Arc::from(&b"%PDF-1.7"[..]);
        let tokens = pipeline.recognize_tokens(source, 3).await.expect("tokens");
        let pages: Vec<_> = tokens.iter().map(|t| t.page).collect();
        assert_eq!(pages, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn rasterization_failure_is_fatal() {
        let pipeline = OcrPipeline::new(
            Arc::new(FailingRasterizer),
            Arc::new(PageTagRecognizer {
                calls: Default::default(),
            }),
            200,
            2,
            SegmentOptions::default(),
        );
        let source: Arc<[u8]> = Arc::from(&b"%PDF-1.7"[..]);
        let err = pipeline
            .extract_sections(source, 2)
            .await
            .expect_err("should fail");
        assert!(matches!(err, EngineError::Rasterization(_)));
    }
}
