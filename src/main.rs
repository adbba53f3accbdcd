use anyhow::{Context, Result};
use parts_catalog_ocr::utils::logging;
use parts_catalog_ocr::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load().context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let app = App::initialize(config).context("初始化失败")?;
    let _report = app.run().await.context("列出图片失败")?;

    Ok(())
}
