//! Version chain invariants and diff pair selection

use apptrust_core::{EntityKind, EntityRecord, Version, VersionId};

use crate::EngineError;

fn violation(message: String) -> EngineError {
    tracing::error!("Integrity violation: {}", message);
    EngineError::Integrity(message)
}

/// Check that `chain` (oldest first) is a valid history of `entity`.
///
/// - every version belongs to the entity
/// - the first version has no parent, every later one points at its predecessor
/// - at most one version is published, and it is the entity's last published version
pub fn verify_chain<E: EntityRecord>(entity: &E, chain: &[Version]) -> Result<(), EngineError> {
    let kind = E::KIND;
    let id = entity.id();

    let mut previous: Option<VersionId> = None;
    for version in chain {
        if version.entity_id != id {
            return Err(violation(format!(
                "version {} belongs to {} {}, not {}",
                version.id, kind, version.entity_id, id
            )));
        }
        if version.parent_id != previous {
            return Err(violation(format!(
                "{} {} version {} has parent {:?}, expected {:?}",
                kind, id, version.id, version.parent_id, previous
            )));
        }
        previous = Some(version.id);
    }

    let published: Vec<VersionId> = chain
        .iter()
        .filter(|v| v.is_published)
        .map(|v| v.id)
        .collect();
    if published.len() > 1 {
        return Err(violation(format!(
            "{} {} has {} versions marked published: {:?}",
            kind,
            id,
            published.len(),
            published
        )));
    }

    let recorded = entity.lifecycle().last_published_version_id;
    if published.first().copied() != recorded {
        return Err(violation(format!(
            "{} {} records last published version {:?} but chain marks {:?}",
            kind,
            id,
            recorded,
            published.first()
        )));
    }

    Ok(())
}

fn find(chain: &[Version], id: VersionId) -> Option<&Version> {
    chain.iter().find(|v| v.id == id)
}

/// Pick the `(base, target)` pair to diff within one entity's chain.
///
/// With `compare_to` the base is that version; without it the base is the
/// target's parent, and a first version is compared against itself.
pub fn select_diff_pair(
    kind: EntityKind,
    chain: &[Version],
    version_id: VersionId,
    compare_to: Option<VersionId>,
) -> Result<(&Version, &Version), EngineError> {
    let target = find(chain, version_id).ok_or_else(|| {
        EngineError::NotFound(format!("{} version {} not found", kind, version_id))
    })?;

    let base = match (compare_to, target.parent_id) {
        (Some(other), _) => find(chain, other).ok_or_else(|| {
            EngineError::InvalidReference(format!("Invalid comparison version {}", other))
        })?,
        (None, Some(parent)) => find(chain, parent).ok_or_else(|| {
            violation(format!(
                "{} version {} has parent {} outside its chain",
                kind, target.id, parent
            ))
        })?,
        (None, None) => target,
    };

    Ok((base, target))
}
