//! Push notifications for flagged symbols.

use crate::verdict::SignalVerdict;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str, attachment: Option<&Path>) -> Result<()>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub url: String,
    /// Bearer token. `SCREENER_NOTIFY_TOKEN` takes precedence when set.
    pub token: String,
    pub message_field: String,
    pub file_field: String,
    /// `{code}` is replaced by the symbol.
    pub quote_url: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://notify-api.line.me/api/notify".to_string(),
            token: String::new(),
            message_field: "message".to_string(),
            file_field: "imageFile".to_string(),
            quote_url: "https://finance.yahoo.co.jp/quote/{code}.T".to_string(),
        }
    }
}

/// Posts a multipart form with the message text and an optional image.
pub struct HttpNotifier {
    client: Client,
    config: NotifierConfig,
}

impl HttpNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, message: &str, attachment: Option<&Path>) -> Result<()> {
        let mut form = Form::new().text(self.config.message_field.clone(), message.to_string());

        if let Some(path) = attachment {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading attachment {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "chart".to_string());
            let part = Part::bytes(bytes)
                .file_name(file_name)
                .mime_str(mime_for(path))?;
            form = form.part(self.config.file_field.clone(), part);
        }

        self.client
            .post(&self.config.url)
            .bearer_auth(&self.config.token)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Stand-in used when notifications are disabled: the message goes to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str, attachment: Option<&Path>) -> Result<()> {
        info!(attachment = ?attachment, "notification{}", message);
        Ok(())
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// One line per field, blank line first so the text starts below the sender name.
pub fn format_verdict_message(verdict: &SignalVerdict, quote_url: &str) -> String {
    let mut message = String::new();
    let _ = write!(message, "\nCode : {}", verdict.symbol);
    let _ = write!(message, "\nName : {}", verdict.name);
    for (key, value) in &verdict.metrics {
        let _ = write!(message, "\n{key} : {value}");
    }
    let _ = write!(message, "\nSell : {}", verdict.sell);
    let _ = write!(message, "\nBuy : {}", verdict.buy);
    if !quote_url.is_empty() {
        let _ = write!(message, "\n{}", quote_url.replace("{code}", &verdict.symbol));
    }
    message
}

pub fn format_summary_message(strategy: &str, flagged: &[SignalVerdict]) -> String {
    let mut message = format!("\n[{strategy}] {} flagged", flagged.len());
    for verdict in flagged {
        let _ = write!(
            message,
            "\n{} {} : {}",
            verdict.symbol,
            verdict.name,
            verdict.label()
        );
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{Decision, MetricValue, Metrics};

    fn verdict() -> SignalVerdict {
        let mut metrics = Metrics::new();
        metrics.insert("PBR".into(), MetricValue::Number(0.92));
        metrics.insert("RSI_9".into(), MetricValue::Number(31.5));
        SignalVerdict::new(
            "6758",
            "Sony Group",
            Decision {
                buy: true,
                sell: false,
            },
            metrics,
        )
    }

    #[test]
    fn message_lists_metrics_and_link() {
        let msg = format_verdict_message(&verdict(), "https://finance.yahoo.co.jp/quote/{code}.T");
        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(
            lines,
            vec![
                "",
                "Code : 6758",
                "Name : Sony Group",
                "PBR : 0.92",
                "RSI_9 : 31.5",
                "Sell : false",
                "Buy : true",
                "https://finance.yahoo.co.jp/quote/6758.T",
            ]
        );
    }

    #[test]
    fn summary_names_each_symbol() {
        let msg = format_summary_message("macd_rsi", &[verdict()]);
        assert!(msg.contains("[macd_rsi] 1 flagged"));
        assert!(msg.contains("6758 Sony Group : BUY"));
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for(Path::new("a/7203.svg")), "image/svg+xml");
        assert_eq!(mime_for(Path::new("7203.png")), "image/png");
        assert_eq!(mime_for(Path::new("7203")), "application/octet-stream");
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        assert!(LogNotifier.send("hello", None).await.is_ok());
    }
}
