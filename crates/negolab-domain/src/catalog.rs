use std::path::{Path, PathBuf};
use std::sync::Arc;

use moka::future::Cache;
use tracing::{debug, info};

use crate::bid_space::BidSpace;
use crate::error::DomainError;
use crate::preference::Preference;

pub const PROFILE_A: &str = "profileA.json";
pub const PROFILE_B: &str = "profileB.json";

/// A loaded negotiation domain: both profiles and their joint bid space.
///
/// Both bid lists are enumerated by the time a `Domain` exists.
#[derive(Debug)]
pub struct Domain {
    name: String,
    profile_a: Arc<Preference>,
    profile_b: Arc<Preference>,
    bid_space: Arc<BidSpace>,
}

impl Domain {
    /// Load `<root>/domain<name>/profileA.json` and `profileB.json`.
    pub fn load(name: &str, root: impl AsRef<Path>) -> Result<Self, DomainError> {
        let dir = domain_dir(root.as_ref(), name);
        if !dir.is_dir() {
            return Err(DomainError::UnknownDomain(format!(
                "{name} (no directory at {})",
                dir.display()
            )));
        }

        let profile_a = Preference::load(dir.join(PROFILE_A))?;
        let profile_b = Preference::load(dir.join(PROFILE_B))?;
        Self::from_preferences(name, profile_a, profile_b)
    }

    pub fn from_preferences(
        name: &str,
        profile_a: Preference,
        profile_b: Preference,
    ) -> Result<Self, DomainError> {
        let profile_a = Arc::new(profile_a);
        let profile_b = Arc::new(profile_b);
        let _ = profile_b.bids();
        let bid_space = BidSpace::new(profile_a.clone(), profile_b.clone())?;

        Ok(Self {
            name: name.to_string(),
            profile_a,
            profile_b,
            bid_space: Arc::new(bid_space),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile_a(&self) -> &Arc<Preference> {
        &self.profile_a
    }

    pub fn profile_b(&self) -> &Arc<Preference> {
        &self.profile_b
    }

    pub fn bid_space(&self) -> &Arc<BidSpace> {
        &self.bid_space
    }

    pub fn size(&self) -> usize {
        self.bid_space.len()
    }
}

fn domain_dir(root: &Path, name: &str) -> PathBuf {
    root.join(format!("domain{name}"))
}

/// Loads domains from a directory tree and keeps recently used ones in a
/// moka cache. Concurrent requests for the same domain share one load.
pub struct DomainCatalog {
    root: PathBuf,
    cache: Cache<String, Arc<Domain>>,
}

impl DomainCatalog {
    pub fn new(root: impl Into<PathBuf>, max_capacity: u64) -> Self {
        Self {
            root: root.into(),
            cache: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch a domain, loading it on a blocking thread on first use.
    pub async fn get(&self, name: &str) -> Result<Arc<Domain>, DomainError> {
        let root = self.root.clone();
        let owned = name.to_string();

        self.cache
            .try_get_with(name.to_string(), async move {
                let domain = tokio::task::spawn_blocking(move || Domain::load(&owned, &root))
                    .await
                    .map_err(|e| DomainError::Load(e.to_string()))??;
                info!(
                    domain = %domain.name(),
                    bids = domain.size(),
                    "Loaded domain"
                );
                Ok::<_, DomainError>(Arc::new(domain))
            })
            .await
            .map_err(|e: Arc<DomainError>| (*e).clone())
    }

    /// Register an in-memory domain under its own name.
    pub async fn insert(&self, domain: Domain) -> Arc<Domain> {
        let domain = Arc::new(domain);
        debug!(domain = %domain.name(), "Registered in-memory domain");
        self.cache
            .insert(domain.name().to_string(), domain.clone())
            .await;
        domain
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.cache.get(name).await.is_some()
    }
}
