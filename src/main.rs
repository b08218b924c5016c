//! SDK Frame 命令行入口
//!
//! 管理本地模块存储、环境变量和远程源。
//!
//! # 命令概览
//!
//! - `env get|set|list|del` - 环境变量
//! - `origin add|update|list|del|make` - 远程源
//! - `module list|info|enable|disable|delete|install|load-zip|check-upgrade|order` - 模块
//! - `check-config` - 验证配置文件
//! - `version` - 显示版本信息
//!
//! # 使用示例
//!
//! ```bash
//! # 添加远程源并刷新目录
//! sdk-frame origin add https://example.com/map.json
//! sdk-frame origin update
//!
//! # 安装模块
//! sdk-frame module install http
//!
//! # 设置环境变量
//! sdk-frame env set port=int:8080
//!
//! # 查看加载顺序
//! sdk-frame module order
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use sdk_frame::acquire::{ConsoleDecisions, InstallReport, OriginIdentity};
use sdk_frame::module::ToggleOutcome;
use sdk_frame::{CoreConfig, EntryPoints, Logger, LoggerConfig, SdkFrame};

/// SDK Frame - 可插拔模块框架
#[derive(Parser)]
#[command(name = "sdk-frame")]
#[command(version, about = "可插拔模块框架命令行工具", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = sdk_frame::core::config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（显示文件名和行号）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 环境变量
    #[command(subcommand)]
    Env(EnvCommand),

    /// 远程源
    #[command(subcommand)]
    Origin(OriginCommand),

    /// 模块
    #[command(subcommand)]
    Module(ModuleCommand),

    /// 验证配置文件
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 查看版本信息
    Version,
}

#[derive(Subcommand)]
enum EnvCommand {
    /// 读取一个变量
    Get { key: String },
    /// 设置变量，格式 key=[type:]value，type 为 str/int/float/bool/json
    Set { assignment: String },
    /// 列出所有变量
    List,
    /// 删除变量
    Del { key: String },
}

#[derive(Subcommand)]
enum OriginCommand {
    /// 添加远程源
    Add { url: String },
    /// 刷新所有远程源的目录
    Update,
    /// 列出远程源
    List,
    /// 删除远程源
    Del { url: String },
    /// 把本地已启用模块发布为远程源
    Make {
        /// 提供方名称（首次发布时使用）
        #[arg(long)]
        name: Option<String>,
        /// 下载基础地址（首次发布时使用）
        #[arg(long)]
        base: Option<String>,
    },
}

#[derive(Subcommand)]
enum ModuleCommand {
    /// 列出已安装模块
    List,
    /// 查看模块详情
    Info { module: String },
    /// 启用模块
    Enable { module: String },
    /// 禁用模块
    Disable { module: String },
    /// 删除模块
    Delete { module: String },
    /// 从远程源安装模块
    Install { query: String },
    /// 从本地安装包安装模块
    LoadZip { path: PathBuf },
    /// 检查并执行升级
    CheckUpgrade,
    /// 显示已启用模块的加载顺序
    Order,
}

type CliResult = anyhow::Result<()>;

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            print_version();
            return Ok(());
        }
        Commands::CheckConfig { ref config } => {
            let path = config.clone().unwrap_or(cli.config);
            return check_config(&path).await;
        }
        _ => {}
    }

    let config = load_config(&cli.config, cli.dev).await?;
    let mut logger_config = LoggerConfig::from_log_config(&config.logging);
    if let Some(level) = cli.log_level {
        logger_config.level = level;
    }
    logger_config.show_file_line = config.dev_mode;
    let _guard = Logger::init(logger_config).context("日志系统初始化失败")?;

    let frame = SdkFrame::new(config, EntryPoints::new())?;

    match cli.command {
        Commands::Env(command) => run_env(&frame, command).await,
        Commands::Origin(command) => run_origin(&frame, command).await,
        Commands::Module(command) => run_module(&frame, command).await,
        Commands::Version | Commands::CheckConfig { .. } => Ok(()),
    }
}

/// 加载配置文件，不存在时使用默认配置
async fn load_config(path: &Path, dev_mode: bool) -> anyhow::Result<CoreConfig> {
    let mut config = CoreConfig::load_or_default(path)
        .await
        .with_context(|| format!("无法加载配置文件 {}", path.display()))?;
    if dev_mode {
        config.dev_mode = true;
    }
    Ok(config)
}

async fn run_env(frame: &SdkFrame, command: EnvCommand) -> CliResult {
    let env = frame.env();
    match command {
        EnvCommand::Get { key } => match env.get(&key).await? {
            Some(value) => println!("{} = {}", key, value),
            None => println!("'{}' 未设置", key),
        },
        EnvCommand::Set { assignment } => {
            let (key, value) = env.set(&assignment).await?;
            println!("{} = {}", key, value);
        }
        EnvCommand::List => {
            let entries = env.list().await?;
            if entries.is_empty() {
                println!("(空)");
            }
            for (key, value) in entries {
                println!("{} = {}", key, value);
            }
        }
        EnvCommand::Del { key } => {
            if env.delete(&key).await? {
                println!("已删除 '{}'", key);
            } else {
                println!("'{}' 未设置", key);
            }
        }
    }
    Ok(())
}

async fn run_origin(frame: &SdkFrame, command: OriginCommand) -> CliResult {
    let snapshots = frame.snapshots();
    match command {
        OriginCommand::Add { url } => {
            if snapshots.add_origin(&url).await? {
                println!("已添加 {}", url);
            } else {
                println!("{} 已存在", url);
            }
        }
        OriginCommand::Update => {
            let snapshot = frame.refresh_catalog().await?;
            println!(
                "已刷新 {} 个提供方，共 {} 个模块",
                snapshot.providers.len(),
                snapshot.modules.len()
            );
        }
        OriginCommand::List => {
            let origins = snapshots.origins().await?;
            if origins.is_empty() {
                println!("(没有远程源)");
            }
            for origin in origins {
                println!("{}", origin);
            }
        }
        OriginCommand::Del { url } => {
            if snapshots.remove_origin(&url).await? {
                println!("已删除 {}", url);
            } else {
                println!("{} 不存在", url);
            }
        }
        OriginCommand::Make { name, base } => {
            let maker = frame.origin_maker();
            let identity = match maker.load_identity().await? {
                Some(identity) => identity,
                None => {
                    let identity = OriginIdentity {
                        name: name.context("首次发布需要 --name")?,
                        base: base.context("首次发布需要 --base")?,
                    };
                    maker.save_identity(&identity).await?;
                    identity
                }
            };
            let document = maker.make(identity).await?;
            println!(
                "已在 {} 生成远程源 '{}'，共 {} 个模块",
                maker.release_dir().display(),
                document.name,
                document.modules.len()
            );
        }
    }
    Ok(())
}

async fn run_module(frame: &SdkFrame, command: ModuleCommand) -> CliResult {
    let manager = frame.manager();
    let store = frame.store();
    match command {
        ModuleCommand::List => {
            let modules = manager.list().await?;
            if modules.is_empty() {
                println!("(没有已安装的模块)");
            }
            for module in modules {
                println!(
                    "{} {:<24} {:<16} v{}",
                    if module.enabled { "✅" } else { "⛔" },
                    module.key(),
                    module.name(),
                    module.version()
                );
            }
        }
        ModuleCommand::Info { module } => {
            let module = manager.info(&store.normalize_key(&module)).await?;
            let d = &module.descriptor;
            println!("包键:     {}", d.package_key);
            println!("名称:     {}", d.name);
            println!("版本:     {}", d.version);
            println!("作者:     {}", d.author);
            println!("描述:     {}", d.description);
            println!("状态:     {}", if module.enabled { "启用" } else { "禁用" });
            println!("依赖:     {}", d.dependencies.join(", "));
            for optional in &d.optional_dependencies {
                println!("可选依赖: {}", optional);
            }
        }
        ModuleCommand::Enable { module } => {
            let key = store.normalize_key(&module);
            match manager.enable(&key).await? {
                ToggleOutcome::Changed => println!("已启用 {}", key),
                ToggleOutcome::Unchanged => println!("{} 已经是启用状态", key),
            }
        }
        ModuleCommand::Disable { module } => {
            let key = store.normalize_key(&module);
            match manager.disable(&key).await? {
                ToggleOutcome::Changed => println!("已禁用 {}", key),
                ToggleOutcome::Unchanged => println!("{} 已经是禁用状态", key),
            }
        }
        ModuleCommand::Delete { module } => {
            let key = store.normalize_key(&module);
            match manager.delete(&key).await? {
                ToggleOutcome::Changed => println!("已删除 {}", key),
                ToggleOutcome::Unchanged => println!("{} 未安装", key),
            }
        }
        ModuleCommand::Install { query } => {
            let engine = frame.engine(Arc::new(ConsoleDecisions::stdio()));
            print_report(&engine.install(&query).await?);
        }
        ModuleCommand::LoadZip { path } => {
            let engine = frame.engine(Arc::new(ConsoleDecisions::stdio()));
            print_report(&engine.install_archive(&path).await?);
        }
        ModuleCommand::CheckUpgrade => {
            let engine = frame.engine(Arc::new(ConsoleDecisions::stdio()));
            let report = engine.check_upgrade().await?;
            if report.plan.is_empty() {
                println!("所有模块都是最新版本");
            }
            for key in &report.upgraded {
                println!("已升级 {}", key);
            }
        }
        ModuleCommand::Order => {
            let order = manager.load_order().await?;
            for (i, key) in order.iter().enumerate() {
                println!("{:>3}. {}", i + 1, key);
            }
        }
    }
    Ok(())
}

fn print_report(report: &InstallReport) {
    for package in &report.installed {
        let source = package
            .source
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "本地安装包".to_string());
        println!(
            "{} {} v{} ({})",
            if package.replaced { "已替换" } else { "已安装" },
            package.package_key,
            package.version,
            source
        );
    }
    if !report.missing_dependencies.is_empty() {
        println!("⚠️  缺少依赖: {}", report.missing_dependencies.join(", "));
    }
    for optional in &report.optional_hints {
        println!("提示: 可选依赖 {} 未安装", optional);
    }
    info!(installed = report.installed.len(), "安装完成");
}

/// 检查配置文件
async fn check_config(path: &Path) -> CliResult {
    println!("检查配置文件: {}", path.display());
    println!();

    let config = if path.exists() {
        match CoreConfig::from_file(path).await {
            Ok(config) => {
                println!("✅ 配置文件有效！");
                config
            }
            Err(e) => {
                println!("❌ 配置文件无效: {}", e);
                return Err(e.into());
            }
        }
    } else {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        CoreConfig::default()
    };

    println!();
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  [日志配置]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", if config.logging.file_output { "是" } else { "否" });
    println!("    JSON 格式:      {}", if config.logging.json_format { "是" } else { "否" });
    println!();
    println!("  [模块存储]");
    println!("    根目录:         {}", config.store.root.display());
    println!("    目录名前缀:     {}", config.store.prefix);
    println!();
    println!("  [远程源]");
    println!("    快照文件:       {}", config.catalog.snapshot_path.display());
    println!("    User-Agent:     {}", config.catalog.user_agent);
    println!();
    println!("  [其他]");
    println!("    环境变量文件:   {}", config.env_file.display());
    println!("    发布目录:       {}", config.origin_maker.release_dir.display());
    println!("    开发模式:       {}", if config.dev_mode { "是" } else { "否" });
    println!("────────────────────────────────────────");
    Ok(())
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("SDK Frame - 可插拔模块框架");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", sdk_frame::VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk_frame::CoreError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_config_error_carries_path_context() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(&path, "logging: [unclosed\n").await.unwrap();

        let err = load_config(&path, false).await.unwrap_err();

        assert!(err.to_string().contains("无法加载配置文件"));
        assert!(err.to_string().contains("config.yaml"));
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::Yaml(_))));
    }

    #[tokio::test]
    async fn test_load_config_missing_file_uses_default() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.yaml"), true).await.unwrap();
        assert!(config.dev_mode);
    }
}
