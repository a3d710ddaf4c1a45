//! Application state shared across handlers.

use crate::adapters::{LogNotifier, MemoryCookieJar, MemoryRuleSink, ReqwestFetcher, TungsteniteConnector};
use crate::contexts::ContextRegistry;
use crate::dispatcher::RelayDispatcher;
use crate::error::RelayResult;
use crate::rules::RuleEngine;
use crate::sockets::SocketProxy;
use crate::traits::{CookieStore, DuplexConnector, Fetcher, Notifier, RuleSink};
use crate::updater::UpdateCacheManager;
use burner_core::clock::{Clock, SystemClock};
use burner_core::config::AppConfig;
use burner_storage::Stores;
use std::sync::Arc;

/// The privileged capabilities the relay drives.
#[derive(Clone)]
pub struct Substrate {
    pub fetcher: Arc<dyn Fetcher>,
    pub cookies: Arc<dyn CookieStore>,
    pub notifier: Arc<dyn Notifier>,
    pub rule_sink: Arc<dyn RuleSink>,
    pub connector: Arc<dyn DuplexConnector>,
    pub clock: Arc<dyn Clock>,
}

impl Substrate {
    /// Network-backed fetcher and sockets with in-process rules, cookies and
    /// notifications.
    pub fn with_default_adapters() -> RelayResult<Self> {
        let cookies: Arc<dyn CookieStore> = Arc::new(MemoryCookieJar::new());
        let fetcher = ReqwestFetcher::new()?.with_cookies(cookies.clone());
        Ok(Self {
            fetcher: Arc::new(fetcher),
            cookies,
            notifier: Arc::new(LogNotifier),
            rule_sink: Arc::new(MemoryRuleSink::new()),
            connector: Arc::new(TungsteniteConnector),
            clock: Arc::new(SystemClock),
        })
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub updater: Arc<UpdateCacheManager>,
    pub rules: Arc<RuleEngine>,
    pub sockets: Arc<SocketProxy>,
    pub contexts: Arc<ContextRegistry>,
    pub dispatcher: Arc<RelayDispatcher>,
}

impl AppState {
    /// Wire every component over `stores` and `substrate`.
    pub fn new(config: AppConfig, stores: Stores, substrate: Substrate) -> Self {
        let contexts = Arc::new(ContextRegistry::new());
        let sockets = Arc::new(SocketProxy::new(
            substrate.connector.clone(),
            contexts.clone(),
            config.sockets.connect_timeout(),
        ));
        let updater = Arc::new(UpdateCacheManager::new(
            config.update.clone(),
            stores.local.clone(),
            substrate.fetcher.clone(),
            substrate.clock.clone(),
        ));
        let rules = Arc::new(RuleEngine::new(
            config.rules.clone(),
            config.panel.clone(),
            stores.synced.clone(),
            substrate.rule_sink.clone(),
        ));
        let dispatcher = Arc::new(RelayDispatcher::new(
            &config,
            stores.synced.clone(),
            updater.clone(),
            rules.clone(),
            sockets.clone(),
            substrate.fetcher.clone(),
            substrate.cookies.clone(),
            substrate.notifier.clone(),
        ));

        Self {
            config: Arc::new(config),
            stores,
            updater,
            rules,
            sockets,
            contexts,
            dispatcher,
        }
    }
}
