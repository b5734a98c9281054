//! Idempotent find-or-create.
//!
//! Instances refuse to create an entity whose unique key is taken, so every
//! creation in the harness goes through [`find_or_create`]: look the entity
//! up, create it if absent, and look it up again if the creation was refused.

use crate::error::{TopologyError, TopologyResult};
use fedsync_client::ClientResult;
use std::future::Future;
use tracing::{debug, info};

/// Outcome of a [`find_or_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert<T> {
    Found(T),
    Created(T),
}

impl<T> Upsert<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, Upsert::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Upsert::Found(value) | Upsert::Created(value) => value,
        }
    }
}

/// Returns the entity matching `matches` from `list`, creating it with
/// `create` if none exists.
///
/// `kind` and `key` only label log lines and errors.
pub async fn find_or_create<T, L, LF, C, CF, P>(
    kind: &'static str,
    key: &str,
    list: L,
    create: C,
    matches: P,
) -> TopologyResult<Upsert<T>>
where
    L: Fn() -> LF,
    LF: Future<Output = ClientResult<Vec<T>>>,
    C: FnOnce() -> CF,
    CF: Future<Output = ClientResult<T>>,
    P: Fn(&T) -> bool,
{
    if let Some(found) = list().await?.into_iter().find(|item| matches(item)) {
        debug!("Found existing {} {}", kind, key);
        return Ok(Upsert::Found(found));
    }

    match create().await {
        Ok(created) => {
            info!("Created {} {}", kind, key);
            Ok(Upsert::Created(created))
        }
        Err(e) if e.is_rejection() => {
            debug!("Creation of {} {} refused ({}), looking it up", kind, key, e);
            list()
                .await?
                .into_iter()
                .find(|item| matches(item))
                .map(Upsert::Found)
                .ok_or_else(|| TopologyError::Inconsistent {
                    kind,
                    key: key.to_string(),
                })
        }
        Err(e) => Err(e.into()),
    }
}
