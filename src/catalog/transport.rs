//! 远程源传输
//!
//! [`Transport`] 抽象目录文档获取和安装包下载，
//! [`HttpTransport`] 基于 reqwest 实现，测试中可替换为内存实现。

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::models::OriginDocument;
use crate::utils::{CoreError, Result};

/// 远程源传输接口
#[async_trait]
pub trait Transport: Send + Sync {
    /// 获取并解析源目录文档
    ///
    /// # Errors
    ///
    /// 网络失败、非 2xx 响应、文档不是合法 JSON 或缺少字段时返回 `TransportFailure`
    async fn fetch_catalog(&self, url: &str) -> Result<OriginDocument>;

    /// 流式下载到本地文件
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP 传输
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// 创建带 User-Agent 的 HTTP 传输
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|e| CoreError::InitFailed(format!("HTTP 客户端创建失败: {}", e)))?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::transport(url, e))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_catalog(&self, url: &str) -> Result<OriginDocument> {
        debug!(origin = %url, "获取源目录");
        let body = self
            .get(url)
            .await?
            .text()
            .await
            .map_err(|e| CoreError::transport(url, e))?;
        serde_json::from_str(&body).map_err(|e| CoreError::transport(url, e))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        debug!(url = %url, dest = %dest.display(), "下载安装包");
        let response = self.get(url).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CoreError::transport(url, e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}
