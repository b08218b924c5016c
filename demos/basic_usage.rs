//! 基本使用示例
//!
//! 本示例展示了 SDK Frame 的基本使用方法，包括：
//!
//! - 在临时工作目录中准备两个模块
//! - 登记入口点并启动框架
//! - 从组合命名空间取回模块实例和能力
//!
//! # 运行示例
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use sdk_frame::{
    CompositionNamespace, CoreConfig, CoreError, EntryPoints, ModuleInstance, ModuleLogger,
    SdkFrame,
};

/// 存储模块：安装时向命名空间挂载一个键值能力
struct Storage;

/// 存储模块提供的能力
struct KeyValue {
    prefix: String,
}

impl ModuleInstance for Storage {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn install(&self, namespace: &mut CompositionNamespace) -> sdk_frame::Result<()> {
        let prefix = namespace
            .env_get("kv_prefix")
            .and_then(|v| v.as_str())
            .unwrap_or("kv")
            .to_string();
        namespace.attach("kv", KeyValue { prefix })
    }
}

/// 问候模块：构造时读取存储模块的能力
struct Greeter {
    prefix: String,
}

impl ModuleInstance for Greeter {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

async fn write_module(root: &Path, key: &str, yaml: &str) -> std::io::Result<()> {
    let dir = root.join(key);
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join("module.yaml"), yaml).await
}

/// 主函数
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== SDK Frame 基本使用示例 ===\n");

    // -------------------------------------------------------------------------
    // 1. 准备工作目录和模块
    // -------------------------------------------------------------------------
    println!("1. 准备工作目录...");

    let workspace = tempfile::tempdir()?;
    let config = CoreConfig::builder().workspace(workspace.path()).build();
    write_module(
        &config.store.root,
        "m_greeter",
        "name: greeter\nversion: '1.0'\ndependencies: [m_storage]\n",
    )
    .await?;
    write_module(&config.store.root, "m_storage", "name: storage\nversion: '0.2.1'\n").await?;
    println!("   模块目录: {}\n", config.store.root.display());

    // -------------------------------------------------------------------------
    // 2. 登记入口点并创建框架
    // -------------------------------------------------------------------------
    println!("2. 创建框架...");

    let entry_points = EntryPoints::new()
        .with("m_storage", |_: &CompositionNamespace, logger: ModuleLogger| {
            logger.info("存储模块已构造");
            let instance: Arc<dyn ModuleInstance> = Arc::new(Storage);
            Ok(instance)
        })
        .with("m_greeter", |namespace: &CompositionNamespace, _: ModuleLogger| {
            let kv = namespace
                .capability::<KeyValue>("kv")
                .ok_or_else(|| CoreError::Internal("kv 能力未挂载".to_string()))?;
            let instance: Arc<dyn ModuleInstance> = Arc::new(Greeter {
                prefix: kv.prefix.clone(),
            });
            Ok(instance)
        });

    let mut frame = SdkFrame::new(config, entry_points)?;
    frame.env().set("kv_prefix=str:demo").await?;
    println!("   加载顺序: {:?}\n", frame.manager().load_order().await?);

    // -------------------------------------------------------------------------
    // 3. 启动并查看命名空间
    // -------------------------------------------------------------------------
    println!("3. 启动框架...");

    let namespace = frame.start().await?;
    println!("   已注册: {:?}", namespace.names());
    if let Some(greeter) = namespace.instance::<Greeter>("greeter") {
        println!("   greeter 使用的前缀: {}", greeter.prefix);
    }
    if let Some(uptime) = frame.uptime() {
        println!("   运行时间: {:?}\n", uptime);
    }

    println!("=== 示例结束 ===");

    Ok(())
}
