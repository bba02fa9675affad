use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};

use enricher_core::config::AppConfig;
use enricher_core::models::{LogCategory, TriggerParams};
use enricher_dispatcher::{TriggerCredentials, TriggerRequest};
use enricher_observability::{init_logging, LogFormat};

mod app;

use app::Application;

const DEFAULT_CONFIG_PATH: &str = "config/enricher.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);
    let mut config = load_config(config_path)?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }

    let log_format: LogFormat = config.observability.log_format.parse()?;
    init_logging(&config.observability.log_level, log_format)?;

    info!("启动商品目录任务编排服务");
    info!("配置文件: {config_path}");

    let metrics = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("安装Prometheus指标记录器失败")?;
        Some(handle)
    } else {
        None
    };

    let app = Application::new(config, metrics).await?;

    let result = match matches.subcommand() {
        Some(("run", run_matches)) => run_once(&app, run_matches).await,
        _ => serve(&app).await,
    };

    app.shutdown().await;
    info!("商品目录任务编排服务已退出");
    result
}

fn cli() -> Command {
    Command::new("enricher")
        .version("1.0.0")
        .about("商品目录自动打标与库存分析任务编排服务")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .global(true),
        )
        .subcommand(Command::new("serve").about("启动HTTP服务（默认）"))
        .subcommand(
            Command::new("run")
                .about("在本地执行一次任务并输出结果")
                .arg(
                    Arg::new("job")
                        .short('j')
                        .long("job")
                        .value_name("JOB")
                        .help("任务类型，如 auto-tag-products 或 inventory-analysis")
                        .required(true),
                )
                .arg(Arg::new("limit").long("limit").value_name("N").help("每批商品数量"))
                .arg(
                    Arg::new("since-days")
                        .long("since-days")
                        .value_name("DAYS")
                        .help("订单统计窗口（天）"),
                )
                .arg(
                    Arg::new("full-sync")
                        .long("full-sync")
                        .help("处理完本次上限后继续创建续跑任务")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("max-products")
                        .long("max-products")
                        .value_name("N")
                        .help("单次运行处理的商品上限"),
                )
                .arg(
                    Arg::new("product-cursor")
                        .long("product-cursor")
                        .value_name("CURSOR")
                        .help("商品分页起点"),
                )
                .arg(
                    Arg::new("order-cursor")
                        .long("order-cursor")
                        .value_name("CURSOR")
                        .help("订单分页起点"),
                ),
        )
}

/// 指定的配置文件不存在时回退到默认搜索路径和环境变量
fn load_config(path: &str) -> Result<AppConfig> {
    if Path::new(path).exists() {
        AppConfig::load(Some(path)).with_context(|| format!("加载配置文件失败: {path}"))
    } else {
        AppConfig::load(None).context("加载默认配置失败")
    }
}

async fn serve(app: &Application) -> Result<()> {
    let bind_address = app.config().server.bind_address.clone();
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("绑定地址失败: {bind_address}"))?;

    info!("HTTP服务启动在 http://{}", bind_address);

    axum::serve(
        listener,
        app.router()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown_signal())
    .await
    .context("HTTP服务运行失败")?;

    info!("HTTP服务已停止");
    Ok(())
}

/// 以本地可信身份执行一次任务
async fn run_once(app: &Application, matches: &ArgMatches) -> Result<()> {
    let arg = |name: &str| matches.get_one::<String>(name).cloned();
    let params = TriggerParams {
        job: arg("job"),
        limit: arg("limit"),
        since_days: arg("since-days"),
        full_sync: matches.get_flag("full-sync").then(|| "true".to_string()),
        max_products: arg("max-products"),
        product_cursor: arg("product-cursor"),
        order_cursor: arg("order-cursor"),
        ..TriggerParams::default()
    };

    let request = TriggerRequest {
        source: LogCategory::System,
        credentials: TriggerCredentials::local(),
        params,
    };

    let response = tokio::time::timeout(
        app.config().server.request_timeout(),
        app.dispatcher().handle_trigger(request),
    )
    .await
    .context("任务执行超时")?;

    println!("{}", serde_json::to_string_pretty(&response)?);

    if response.success {
        Ok(())
    } else {
        error!("任务执行失败: {}", response.message);
        Err(anyhow::anyhow!(response.message))
    }
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
    info!("收到关闭信号，开始优雅关闭...");
}
