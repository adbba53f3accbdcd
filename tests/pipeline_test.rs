use async_trait::async_trait;
use image::{Rgb, RgbImage};
use parts_catalog_ocr::config::{Config, InputSource};
use parts_catalog_ocr::error::{InferenceError, SinkError};
use parts_catalog_ocr::models::{PipelineOutcome, UsageStats};
use parts_catalog_ocr::services::{
    CanonicalImage, Infer, InferenceReply, LocalDirSource, RowSink,
};
use parts_catalog_ocr::App;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 按图片宽度返回预设结果的假模型
enum Script {
    Reply {
        text: &'static str,
        usage: UsageStats,
        delay_ms: u64,
    },
    Fail {
        usage: Option<UsageStats>,
    },
}

#[derive(Default)]
struct ScriptedInfer {
    scripts: HashMap<u32, Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedInfer {
    fn with(mut self, width: u32, script: Script) -> Self {
        self.scripts.insert(width, script);
        self
    }
}

#[async_trait]
impl Infer for ScriptedInfer {
    async fn infer(
        &self,
        image: &CanonicalImage,
        _prompt: &str,
    ) -> Result<InferenceReply, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match self.scripts.get(&image.width()) {
            Some(Script::Reply {
                text,
                usage,
                delay_ms,
            }) => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                Ok(InferenceReply {
                    text: Some(text.to_string()),
                    usage: Some(*usage),
                })
            }
            Some(Script::Fail { usage }) => {
                Err(InferenceError::with_usage("quota exceeded", *usage))
            }
            None => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(InferenceReply {
                    text: Some("[]".to_string()),
                    usage: None,
                })
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// 内存表格
#[derive(Default)]
struct MemorySheet {
    grid: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl RowSink for MemorySheet {
    async fn read_range(&self, _range: &str) -> Result<Vec<Vec<String>>, SinkError> {
        Ok(self.grid.lock().unwrap().clone())
    }

    async fn write_range(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), SinkError> {
        let cell = range.split('!').nth(1).unwrap_or("A1");
        let start: usize = cell.trim_start_matches('A').parse().unwrap_or(1);
        let mut grid = self.grid.lock().unwrap();
        for (offset, row) in rows.into_iter().enumerate() {
            let index = start - 1 + offset;
            if grid.len() <= index {
                grid.resize(index + 1, Vec::new());
            }
            grid[index] = row;
        }
        Ok(())
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "parts_ocr_pipeline_{}_{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.join("images")).unwrap();
    dir
}

/// 生成宽度为 `width` 的 PNG
fn write_png(dir: &Path, name: &str, width: u32) {
    RgbImage::from_pixel(width, 8, Rgb([200, 200, 200]))
        .save(dir.join("images").join(name))
        .unwrap();
}

fn test_config(dir: &Path, max_concurrent: usize) -> Config {
    Config {
        max_concurrent_ocr: max_concurrent,
        input_dir: Some(dir.join("images").display().to_string()),
        output_report_file: dir.join("report.md").display().to_string(),
        save_normalized_images: false,
        llm_api_key: "test-key".to_string(),
        ..Default::default()
    }
}

fn build_app(
    dir: &Path,
    max_concurrent: usize,
    infer: Arc<ScriptedInfer>,
    sheet: Option<Arc<MemorySheet>>,
) -> App {
    build_app_with(
        test_config(dir, max_concurrent),
        dir,
        infer,
        sheet.map(|s| s as Arc<dyn RowSink>),
    )
}

fn build_app_with(
    config: Config,
    dir: &Path,
    infer: Arc<ScriptedInfer>,
    sink: Option<Arc<dyn RowSink>>,
) -> App {
    let images = dir.join("images");
    App::with_components(
        config,
        InputSource::LocalDir(images.display().to_string()),
        Arc::new(LocalDirSource::new(images)),
        infer,
        sink,
    )
}

/// 读取正常、写入总是失败的表格
struct RejectingSheet;

#[async_trait]
impl RowSink for RejectingSheet {
    async fn read_range(&self, _range: &str) -> Result<Vec<Vec<String>>, SinkError> {
        Ok(Vec::new())
    }

    async fn write_range(&self, _range: &str, _rows: Vec<Vec<String>>) -> Result<(), SinkError> {
        Err(SinkError::BadResponse {
            endpoint: "memory".to_string(),
            status: 403,
            body: "permission denied".to_string(),
        })
    }
}

fn one_record_infer(width: u32) -> Arc<ScriptedInfer> {
    Arc::new(ScriptedInfer::default().with(
        width,
        Script::Reply {
            text: "```json\n[{\"part_number\": \"S-1\"}]\n```",
            usage: UsageStats::new(2, 1, 3),
            delay_ms: 0,
        },
    ))
}

const TWO_RECORDS: &str = r#"Here is the data:
```json
[
  {"part_number": "P-1", "part_name": "Brake pad", "vehicle_model": "Vios", "vehicle_year": "2019", "retail_price": "1200", "wholesale_price": "950"},
  {"part_number": "P-2", "part_name": "Oil filter", "vehicle_model": "Jazz", "vehicle_year": 2020, "retail_price": "250"}
]
```"#;

#[tokio::test]
async fn test_mixed_batch_counts_rows_and_usage() {
    let dir = scratch_dir("mixed");
    write_png(&dir, "a.png", 21);
    write_png(&dir, "b.png", 22);
    write_png(&dir, "c.png", 23);

    let infer = Arc::new(
        ScriptedInfer::default()
            .with(
                21,
                Script::Reply {
                    text: TWO_RECORDS,
                    usage: UsageStats::new(100, 50, 150),
                    delay_ms: 5,
                },
            )
            .with(
                22,
                Script::Reply {
                    text: "Sorry, I could not read this page.",
                    usage: UsageStats::new(80, 10, 90),
                    delay_ms: 5,
                },
            )
            .with(
                23,
                Script::Fail {
                    usage: Some(UsageStats::new(40, 0, 40)),
                },
            ),
    );
    let sheet = Arc::new(MemorySheet::default());
    let app = build_app(&dir, 2, infer.clone(), Some(sheet.clone()));

    let report = app.run().await.unwrap().expect("有图片时应返回报告");
    let summary = &report.summary;
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.empty, 0);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.record_count(), 2);
    assert_eq!(summary.usage, UsageStats::new(220, 60, 280));
    assert!(report.sink_errors.is_empty());
    assert_eq!(report.rows_written, Some(4));

    let names: Vec<&str> = summary.results.iter().map(|(i, _)| i.name.as_str()).collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.png"]);

    let grid = sheet.grid.lock().unwrap().clone();
    assert_eq!(grid.len(), 5);
    assert_eq!(grid[0][0], "Timestamp");
    assert_eq!(grid[1][1], "a.png");
    assert_eq!(grid[1][2], "P-1");
    assert_eq!(grid[2][2], "P-2");
    assert_eq!(grid[2][5], "2020");
    assert_eq!(grid[2][7], "N/A");
    assert_eq!(grid[3][2], "ERROR: NoStructureFound");
    assert_eq!(grid[4][1], "c.png");
    assert_eq!(grid[4][2], "ERROR: InferenceError");

    let written = report.report_path.expect("报告应已写入");
    let markdown = std::fs::read_to_string(written).unwrap();
    assert!(markdown.contains("## a.png"));
    assert!(markdown.contains("P-1"));
    assert!(markdown.contains("- Failed: 2"));
    assert!(markdown.contains("- Total tokens: 280"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_inference_concurrency_is_capped() {
    let dir = scratch_dir("cap");
    let mut infer = ScriptedInfer::default();
    for width in 30..36 {
        write_png(&dir, &format!("page_{}.png", width), width);
        infer = infer.with(
            width,
            Script::Reply {
                text: "```json\n[{\"part_number\": \"X\"}]\n```",
                usage: UsageStats::new(1, 1, 2),
                delay_ms: 40,
            },
        );
    }
    let infer = Arc::new(infer);
    let app = build_app(&dir, 2, infer.clone(), None);

    let report = app.run().await.unwrap().unwrap();
    assert_eq!(report.summary.succeeded, 6);
    assert_eq!(report.rows_written, None);
    assert_eq!(infer.calls.load(Ordering::SeqCst), 6);

    let max = infer.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "并发上限被突破: {}", max);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_results_keep_input_order() {
    let dir = scratch_dir("order");
    let mut infer = ScriptedInfer::default();
    // 越靠前的图片越晚完成
    for (i, width) in (40..45).enumerate() {
        write_png(&dir, &format!("{}.png", i), width);
        infer = infer.with(
            width,
            Script::Reply {
                text: "[]",
                usage: UsageStats::new(1, 0, 1),
                delay_ms: 60 - (i as u64) * 10,
            },
        );
    }
    let app = build_app(&dir, 5, Arc::new(infer), None);

    let report = app.run().await.unwrap().unwrap();
    let names: Vec<&str> = report
        .summary
        .results
        .iter()
        .map(|(i, _)| i.name.as_str())
        .collect();
    assert_eq!(names, vec!["0.png", "1.png", "2.png", "3.png", "4.png"]);
    assert_eq!(report.summary.empty, 5);
    assert_eq!(report.summary.usage.total_tokens, 5);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_single_failure_is_isolated() {
    let dir = scratch_dir("isolation");
    let mut infer = ScriptedInfer::default();
    for width in 60..65 {
        write_png(&dir, &format!("scan_{}.jpg", width), width);
        let script = if width == 62 {
            Script::Fail { usage: None }
        } else {
            Script::Reply {
                text: "```json\n[{\"part_number\": \"  K-9  \", \"part_name\": \"\"}]\n```",
                usage: UsageStats::new(3, 2, 5),
                delay_ms: 10,
            }
        };
        infer = infer.with(width, script);
    }
    let sheet = Arc::new(MemorySheet::default());
    let app = build_app(&dir, 3, Arc::new(infer), Some(sheet.clone()));

    let report = app.run().await.unwrap().unwrap();
    assert_eq!(report.summary.attempted, 5);
    assert_eq!(report.summary.succeeded, 4);
    assert_eq!(report.summary.failed, 1);
    assert!(report.summary.results[2].1.is_failure());
    assert_eq!(report.summary.usage.total_tokens, 20);

    let grid = sheet.grid.lock().unwrap().clone();
    assert_eq!(grid.len(), 6);
    assert_eq!(grid[1][2], "K-9");
    assert_eq!(grid[1][3], "N/A");
    // 没有任何空单元格
    assert!(grid.iter().skip(1).flatten().all(|cell| !cell.is_empty()));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_invalid_image_does_not_stop_batch() {
    let dir = scratch_dir("invalid");
    write_png(&dir, "good.png", 50);
    std::fs::write(dir.join("images").join("broken.jpg"), b"not an image").unwrap();

    let infer = Arc::new(ScriptedInfer::default().with(
        50,
        Script::Reply {
            text: TWO_RECORDS,
            usage: UsageStats::new(10, 10, 20),
            delay_ms: 0,
        },
    ));
    let sheet = Arc::new(MemorySheet::default());
    let app = build_app(&dir, 3, infer.clone(), Some(sheet.clone()));

    let report = app.run().await.unwrap().unwrap();
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.failed, 1);
    // 损坏的图片不会调用模型
    assert_eq!(infer.calls.load(Ordering::SeqCst), 1);

    let (image, outcome) = &report.summary.results[0];
    assert_eq!(image.name, "broken.jpg");
    match outcome {
        PipelineOutcome::Failure { reason, usage } => {
            assert_eq!(reason.kind(), "InvalidImage");
            assert!(usage.is_none());
        }
        other => panic!("应为失败: {:?}", other),
    }

    let grid = sheet.grid.lock().unwrap().clone();
    assert_eq!(grid[1][2], "ERROR: InvalidImage");
    assert_eq!(grid.len(), 4);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_empty_batch_writes_nothing() {
    let dir = scratch_dir("empty");
    std::fs::write(dir.join("images").join("readme.txt"), b"no images").unwrap();

    let sheet = Arc::new(MemorySheet::default());
    let app = build_app(
        &dir,
        2,
        Arc::new(ScriptedInfer::default()),
        Some(sheet.clone()),
    );

    let report = app.run().await.unwrap();
    assert!(report.is_none());
    assert!(!dir.join("report.md").exists());
    assert!(sheet.grid.lock().unwrap().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_report_failure_still_fills_sheet() {
    let dir = scratch_dir("report_fails");
    write_png(&dir, "a.png", 70);
    // 报告路径的上级是一个普通文件，无法创建目录
    std::fs::write(dir.join("blocker"), b"file").unwrap();
    let config = Config {
        output_report_file: dir.join("blocker").join("report.md").display().to_string(),
        ..test_config(&dir, 2)
    };
    let sheet = Arc::new(MemorySheet::default());
    let app = build_app_with(
        config,
        &dir,
        one_record_infer(70),
        Some(sheet.clone() as Arc<dyn RowSink>),
    );

    let report = app.run().await.unwrap().unwrap();
    assert_eq!(report.summary.succeeded, 1);
    assert!(report.report_path.is_none());
    assert_eq!(report.sink_errors.len(), 1);
    assert!(matches!(report.sink_errors[0], SinkError::Io { .. }));
    assert_eq!(report.rows_written, Some(1));

    let grid = sheet.grid.lock().unwrap().clone();
    assert_eq!(grid.len(), 2);
    assert_eq!(grid[1][2], "S-1");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_sheet_failure_still_writes_report() {
    let dir = scratch_dir("sheet_fails");
    write_png(&dir, "a.png", 71);
    let app = build_app_with(
        test_config(&dir, 2),
        &dir,
        one_record_infer(71),
        Some(Arc::new(RejectingSheet) as Arc<dyn RowSink>),
    );

    let report = app.run().await.unwrap().unwrap();
    assert_eq!(report.rows_written, None);
    assert_eq!(report.sink_errors.len(), 1);
    assert!(matches!(
        report.sink_errors[0],
        SinkError::BadResponse { status: 403, .. }
    ));

    let written = report.report_path.expect("报告应已写入");
    let markdown = std::fs::read_to_string(written).unwrap();
    assert!(markdown.contains("S-1"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_zero_cap_still_completes() {
    let dir = scratch_dir("zero_cap");
    write_png(&dir, "a.png", 72);
    let app = build_app(&dir, 0, one_record_infer(72), None);

    let report = tokio::time::timeout(Duration::from_secs(10), app.run())
        .await
        .expect("并发上限为 0 时不应挂起")
        .unwrap()
        .unwrap();
    assert_eq!(report.summary.succeeded, 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_initialize_rejects_missing_api_key() {
    let dir = scratch_dir("init");
    let config = Config {
        llm_api_key: String::new(),
        ..test_config(&dir, 2)
    };
    assert!(App::initialize(config).is_err());

    let _ = std::fs::remove_dir_all(&dir);
}
