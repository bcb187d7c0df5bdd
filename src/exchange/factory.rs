use std::sync::Arc;
use tracing::info;

use crate::adapters::{HttpAccountClient, HttpIndicatorFeed, HttpOrderGateway, PaperExchange};
use crate::config::AppConfig;
use crate::error::{RatchetError, Result};

use super::{AccountClient, ExecutionMode, IndicatorFeed, OrderGateway};

/// The three collaborators a cycle talks to
#[derive(Clone)]
pub struct Collaborators {
    pub mode: ExecutionMode,
    pub feed: Arc<dyn IndicatorFeed>,
    pub account: Arc<dyn AccountClient>,
    pub gateway: Arc<dyn OrderGateway>,
}

fn required_url<'a>(value: &'a Option<String>, key: &str, mode: ExecutionMode) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| {
            RatchetError::Validation(format!("adapters.{key} is required in {mode} mode"))
        })
}

/// Create the runtime collaborators from `AppConfig`.
///
/// Paper mode still reads real snapshots from the feed; only the account
/// and order gateway are simulated.
pub fn build_collaborators(app_config: &AppConfig, mode: ExecutionMode) -> Result<Collaborators> {
    let adapters = &app_config.adapters;
    let feed_url = required_url(&adapters.feed_url, "feed_url", mode)?;
    let feed = Arc::new(HttpIndicatorFeed::new(
        feed_url,
        app_config.engine.feed_timeout_ms,
    )?);

    match mode {
        ExecutionMode::Paper => {
            let paper = Arc::new(PaperExchange::new(adapters.paper_capital));
            Ok(Collaborators {
                mode,
                feed,
                account: paper.clone(),
                gateway: paper,
            })
        }
        ExecutionMode::Live => {
            let account_url = required_url(&adapters.account_url, "account_url", mode)?;
            let gateway_url = required_url(&adapters.gateway_url, "gateway_url", mode)?;
            let timeout_ms = app_config.execution.order_timeout_ms;

            info!("Live execution via {}", gateway_url);
            Ok(Collaborators {
                mode,
                feed,
                account: Arc::new(HttpAccountClient::new(account_url, timeout_ms)?),
                gateway: Arc::new(HttpOrderGateway::new(gateway_url, timeout_ms)?),
            })
        }
    }
}
