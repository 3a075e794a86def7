use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::MacAddress;
use crate::clock::Clock;
use crate::error::Result;
use crate::store::{DocumentStore, Repository, Versioned, keys};

/// The devices a user has been seen with, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeviceBinding {
    pub username: String,
    pub domain: String,
    #[serde(default)]
    pub macs: Vec<MacAddress>,
    #[serde(default)]
    pub updated_at: Option<SystemTime>,
}

impl UserDeviceBinding {
    /// User names are stored lower-cased.
    pub fn new(username: &str, domain: &str) -> Self {
        Self {
            username: username.to_lowercase(),
            domain: domain.to_string(),
            macs: Vec::new(),
            updated_at: None,
        }
    }

    pub fn key(&self) -> String {
        keys::user_devices(&self.username)
    }

    pub fn contains(&self, mac: &MacAddress) -> bool {
        self.macs.contains(mac)
    }

    /// Move `mac` to the front, keeping at most `max` entries.
    pub fn push(&mut self, mac: MacAddress, max: usize) {
        self.macs.retain(|m| *m != mac);
        self.macs.insert(0, mac);
        self.macs.truncate(max.max(1));
    }

    /// Drop `mac`. Returns whether it was listed.
    pub fn forget(&mut self, mac: &MacAddress) -> bool {
        let before = self.macs.len();
        self.macs.retain(|m| m != mac);
        self.macs.len() != before
    }
}

/// Device ownership: each MAC belongs to at most one user, with a
/// `macuser-` reverse index for owner lookups.
#[derive(Debug, Clone)]
pub struct UserDevices<S> {
    repo: Repository<S>,
    clock: Arc<dyn Clock>,
    max_devices: usize,
}

impl<S: DocumentStore> UserDevices<S> {
    pub fn new(repo: Repository<S>, clock: Arc<dyn Clock>, max_devices: usize) -> Self {
        Self {
            repo,
            clock,
            max_devices: max_devices.max(1),
        }
    }

    /// Bind `mac` to `username`, taking it away from whoever had it.
    ///
    /// The whole operation re-runs on a write conflict. The reverse index
    /// is written last and with a version check, so two users racing for
    /// the same MAC cannot both finish.
    pub async fn add(&self, username: &str, domain: &str, mac: MacAddress) -> Result<UserDeviceBinding> {
        let user = username.to_lowercase();
        let own_key = keys::user_devices(&user);
        let index_key = keys::mac_user(&mac);

        let binding = self
            .repo
            .with_conflict_retry(&own_key, || async {
                let now = self.clock.now();
                let index = self.repo.get::<String>(&index_key).await?;

                for mut other in self.repo.scan::<UserDeviceBinding>(keys::USER_DEVICES).await? {
                    if other.value.username != user && other.value.forget(&mac) {
                        other.value.updated_at = Some(now);
                        self.repo.save(&other.value.key(), &other).await?;
                        tracing::debug!(target: "netloc::tracking", { %mac, from = %other.value.username, to = %user }, "device changed owner");
                    }
                }

                let mut own = self
                    .repo
                    .get_or_else(&own_key, || UserDeviceBinding::new(&user, domain))
                    .await?;
                own.value.domain = domain.to_string();
                own.value.push(mac, self.max_devices);
                own.value.updated_at = Some(now);
                self.repo.save(&own_key, &own).await?;

                let index = match index {
                    Some(doc) => Versioned {
                        value: user.clone(),
                        cas: doc.cas,
                    },
                    None => Versioned::new(user.clone()),
                };
                self.repo.save(&index_key, &index).await?;
                Ok(own.value)
            })
            .await?;
        tracing::info!(target: "netloc::tracking", { %mac, user = %binding.username, devices = binding.macs.len() }, "device bound");
        Ok(binding)
    }

    /// Unbind `mac` from `username`. Returns whether it was in their list.
    /// The reverse index is only dropped if it still names this user.
    pub async fn remove(&self, username: &str, mac: &MacAddress) -> Result<bool> {
        let user = username.to_lowercase();
        let own_key = keys::user_devices(&user);
        let index_key = keys::mac_user(mac);

        self.repo
            .with_conflict_retry(&own_key, || async {
                let mut removed = false;
                if let Some(mut own) = self.repo.get::<UserDeviceBinding>(&own_key).await? {
                    if own.value.forget(mac) {
                        own.value.updated_at = Some(self.clock.now());
                        self.repo.save(&own_key, &own).await?;
                        removed = true;
                    }
                }
                if let Some(index) = self.repo.get::<String>(&index_key).await? {
                    if index.value == user {
                        self.repo.remove(&index_key, index.cas).await?;
                    }
                }
                Ok(removed)
            })
            .await
    }

    /// Whether anyone owns `mac`. Ownership outlives the history: a MAC
    /// pushed out of its owner's recent list is still owned here, though
    /// [`with_mac`](Self::with_mac) no longer finds it.
    pub async fn has(&self, mac: &MacAddress) -> Result<bool> {
        Ok(self.owner(mac).await?.is_some())
    }

    /// The user currently owning `mac`, from the reverse index.
    pub async fn owner(&self, mac: &MacAddress) -> Result<Option<String>> {
        Ok(self
            .repo
            .get::<String>(&keys::mac_user(mac))
            .await?
            .map(|doc| doc.value))
    }

    /// The binding that lists `mac`.
    pub async fn with_mac(&self, mac: &MacAddress) -> Result<Option<UserDeviceBinding>> {
        let Some(user) = self.owner(mac).await? else {
            return Ok(None);
        };
        Ok(self
            .repo
            .get::<UserDeviceBinding>(&keys::user_devices(&user))
            .await?
            .map(|doc| doc.value)
            .filter(|binding| binding.contains(mac)))
    }

    /// The stored binding for `username`, or a fresh empty one. Never
    /// writes.
    pub async fn for_user(&self, username: &str, domain: &str) -> Result<UserDeviceBinding> {
        Ok(self
            .repo
            .get_or_else(&keys::user_devices(username), || UserDeviceBinding::new(username, domain))
            .await?
            .value)
    }

    /// Every stored binding on `domain`, compared case-insensitively.
    pub async fn on_domain(&self, domain: &str) -> Result<Vec<UserDeviceBinding>> {
        Ok(self
            .repo
            .scan::<UserDeviceBinding>(keys::USER_DEVICES)
            .await?
            .into_iter()
            .map(|doc| doc.value)
            .filter(|binding| binding.domain.eq_ignore_ascii_case(domain))
            .collect())
    }
}
