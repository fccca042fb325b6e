//! The metering service: entitlement, counting, decision, recording.
//!
//! Every datastore call is bounded by a timeout and every failure is mapped
//! to a safe value through [`masthead_core::policy::recover`], so
//! [`Meter::check_and_record`] always produces a decision.

use std::{
  future::Future,
  sync::{Arc, RwLock},
  time::Duration,
};

use masthead_core::{
  clock::Clock,
  identity::Identity,
  paywall::{PaywallConfig, PaywallConfigUpdate},
  policy::{Decision, Entitlement, MeteringError, PriorViews, Stage, decide, recover},
  store::MeterStore,
  view::{ArticleRef, NewPageView, RequestMeta},
};
use chrono::{DateTime, Utc};
use tokio::time::Instant;

// ─── Config cache ────────────────────────────────────────────────────────────

struct CachedConfig {
  config:     PaywallConfig,
  fetched_at: Instant,
}

/// Read-through cache over the paywall singleton.
///
/// The TTL bounds how stale another instance's admin update can appear here;
/// updates made through this process replace the entry immediately.
struct ConfigCache {
  ttl:  Duration,
  slot: RwLock<Option<CachedConfig>>,
}

impl ConfigCache {
  fn new(ttl: Duration) -> Self { Self { ttl, slot: RwLock::new(None) } }

  fn fresh(&self) -> Option<PaywallConfig> {
    let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
    slot
      .as_ref()
      .filter(|c| c.fetched_at.elapsed() < self.ttl)
      .map(|c| c.config.clone())
  }

  fn last_known(&self) -> Option<PaywallConfig> {
    let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
    slot.as_ref().map(|c| c.config.clone())
  }

  fn put(&self, config: PaywallConfig) {
    let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(CachedConfig { config, fetched_at: Instant::now() });
  }
}

// ─── Meter ───────────────────────────────────────────────────────────────────

/// Tuning knobs for a [`Meter`].
#[derive(Debug, Clone, Copy)]
pub struct MeterSettings {
  /// Upper bound on each datastore call.
  pub store_timeout: Duration,
  pub config_ttl:    Duration,
}

pub struct Meter<S> {
  store:    Arc<S>,
  clock:    Arc<dyn Clock>,
  settings: MeterSettings,
  config:   ConfigCache,
}

impl<S: MeterStore> Meter<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, settings: MeterSettings) -> Self {
    Self {
      store,
      clock,
      config: ConfigCache::new(settings.config_ttl),
      settings,
    }
  }

  /// Decide whether `identity` may read `article`, then record the view.
  ///
  /// The view is written after the decision and regardless of it; a failed
  /// write is logged and does not change the answer.
  pub async fn check_and_record(
    &self,
    identity: Identity,
    article: ArticleRef,
    meta: RequestMeta,
  ) -> Decision {
    let config = self.paywall_config().await;

    let entitlement = match &identity {
      Identity::User { user_id } => recover(self.entitlement(user_id.clone()).await),
      Identity::Anonymous { .. } => Entitlement::Metered,
    };

    let now = self.clock.now();
    let prior = match entitlement {
      Entitlement::Subscriber => PriorViews(0),
      Entitlement::Metered => {
        recover(self.prior_views(identity.clone(), config.window_start(now)).await)
      }
    };

    let decision = decide(entitlement, prior, config.free_article_limit);
    tracing::debug!(
      article_id = %article.article_id,
      anonymous = identity.is_anonymous(),
      blocked = decision.blocked,
      count = decision.count,
      limit = decision.limit,
      "metering decision"
    );

    let record = NewPageView { identity, article, meta, viewed_at: now };
    if let Err(err) = self.bounded(Stage::RecordView, self.store.record_view(record)).await {
      tracing::error!(error = %err, "failed to record page view, decision unchanged");
    }

    decision
  }

  /// The current paywall configuration, from cache when fresh.
  ///
  /// On a failed read the last cached value is reused; with nothing cached
  /// the built-in defaults apply.
  pub async fn paywall_config(&self) -> PaywallConfig {
    if let Some(config) = self.config.fresh() {
      return config;
    }

    let fetched = self
      .bounded(Stage::Config, self.store.get_or_create_paywall_config())
      .await;

    match fetched {
      Ok(config) => {
        self.config.put(config.clone());
        config
      }
      Err(err) => match self.config.last_known() {
        Some(stale) => {
          tracing::warn!(error = %err, "paywall config read failed, reusing cached value");
          stale
        }
        None => recover(Err(err)),
      },
    }
  }

  /// Persist a new configuration and make it visible to this process
  /// immediately.
  pub async fn update_paywall_config(
    &self,
    update: PaywallConfigUpdate,
  ) -> Result<PaywallConfig, S::Error> {
    let config = self.store.update_paywall_config(update).await?;
    tracing::info!(
      free_article_limit = config.free_article_limit,
      reset_period_days = config.reset_period_days,
      "paywall config updated"
    );
    self.config.put(config.clone());
    Ok(config)
  }

  async fn entitlement(&self, user_id: String) -> Result<Entitlement, MeteringError> {
    let subscription = self
      .bounded(Stage::Entitlement, self.store.find_subscription(user_id))
      .await?;

    Ok(match subscription {
      Some(s) if s.status.is_entitled() => Entitlement::Subscriber,
      _ => Entitlement::Metered,
    })
  }

  async fn prior_views(
    &self,
    identity: Identity,
    since: DateTime<Utc>,
  ) -> Result<PriorViews, MeteringError> {
    let count = self
      .bounded(Stage::ViewCount, self.store.count_views(identity, since))
      .await?;
    Ok(PriorViews(count))
  }

  async fn bounded<T, E>(
    &self,
    stage: Stage,
    call: impl Future<Output = Result<T, E>>,
  ) -> Result<T, MeteringError>
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    let after = self.settings.store_timeout;
    match tokio::time::timeout(after, call).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(e)) => Err(MeteringError::Store { stage, source: Box::new(e) }),
      Err(_) => Err(MeteringError::Timeout { stage, after }),
    }
  }
}
