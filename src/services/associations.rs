//! Association-sync: reconcile a submitted list of related ids against the
//! persisted join-table rows. Removed links are deleted, added links are
//! bulk-inserted, the intersection is left untouched. Every sync runs on a
//! caller-owned transaction so an entity save and its join updates commit
//! or roll back together.
//!
//! Join table and column names are compile-time constants supplied by the
//! entity handlers, never request input.

use sqlx::{Postgres, Transaction};
use std::collections::HashSet;
use std::hash::Hash;
use uuid::Uuid;

/// Set difference between submitted and persisted id lists.
#[derive(Debug, PartialEq, Eq)]
pub struct IdDiff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

pub fn diff_ids<T: Copy + Eq + Hash>(submitted: &[T], persisted: &[T]) -> IdDiff<T> {
    let submitted_set: HashSet<T> = submitted.iter().copied().collect();
    let persisted_set: HashSet<T> = persisted.iter().copied().collect();

    // Preserve submitted order for inserts; dedupe repeats.
    let mut seen = HashSet::new();
    let added = submitted
        .iter()
        .copied()
        .filter(|id| !persisted_set.contains(id) && seen.insert(*id))
        .collect();
    let removed = persisted
        .iter()
        .copied()
        .filter(|id| !submitted_set.contains(id))
        .collect();

    IdDiff { added, removed }
}

/// Sync a uuid/uuid join table (e.g. barrier_behaviours).
pub async fn sync_uuid_join(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    owner_col: &str,
    related_col: &str,
    owner_id: Uuid,
    submitted: &[Uuid],
) -> Result<IdDiff<Uuid>, sqlx::Error> {
    let select = format!("SELECT {} FROM {} WHERE {} = $1", related_col, table, owner_col);
    let persisted: Vec<Uuid> = sqlx::query_scalar(&select)
        .bind(owner_id)
        .fetch_all(&mut **tx)
        .await?;

    let diff = diff_ids(submitted, &persisted);

    if !diff.removed.is_empty() {
        let delete = format!(
            "DELETE FROM {} WHERE {} = $1 AND {} = ANY($2)",
            table, owner_col, related_col
        );
        sqlx::query(&delete)
            .bind(owner_id)
            .bind(&diff.removed)
            .execute(&mut **tx)
            .await?;
    }

    if !diff.added.is_empty() {
        let insert = format!(
            "INSERT INTO {} ({}, {}) SELECT $1, unnest($2::uuid[])",
            table, owner_col, related_col
        );
        sqlx::query(&insert)
            .bind(owner_id)
            .bind(&diff.added)
            .execute(&mut **tx)
            .await?;
    }

    Ok(diff)
}

/// Sync a uuid/int join table (country links).
pub async fn sync_int_join(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    owner_col: &str,
    related_col: &str,
    owner_id: Uuid,
    submitted: &[i32],
) -> Result<IdDiff<i32>, sqlx::Error> {
    let select = format!("SELECT {} FROM {} WHERE {} = $1", related_col, table, owner_col);
    let persisted: Vec<i32> = sqlx::query_scalar(&select)
        .bind(owner_id)
        .fetch_all(&mut **tx)
        .await?;

    let diff = diff_ids(submitted, &persisted);

    if !diff.removed.is_empty() {
        let delete = format!(
            "DELETE FROM {} WHERE {} = $1 AND {} = ANY($2)",
            table, owner_col, related_col
        );
        sqlx::query(&delete)
            .bind(owner_id)
            .bind(&diff.removed)
            .execute(&mut **tx)
            .await?;
    }

    if !diff.added.is_empty() {
        let insert = format!(
            "INSERT INTO {} ({}, {}) SELECT $1, unnest($2::int[])",
            table, owner_col, related_col
        );
        sqlx::query(&insert)
            .bind(owner_id)
            .bind(&diff.added)
            .execute(&mut **tx)
            .await?;
    }

    Ok(diff)
}

/// Submitted country association with optional per-country state overrides.
/// An empty/absent state list means "whole country".
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CountrySelection {
    pub country_id: i32,
    #[serde(default)]
    pub state_ids: Vec<i32>,
}

/// Table names for an entity's country/state override pair.
pub struct CountryTables {
    pub countries: &'static str,
    pub states: &'static str,
    pub owner_col: &'static str,
}

/// Country/state override-diffing. The country join is synced first; state
/// rows for removed countries are dropped wholesale, then each submitted
/// country's state list replaces its persisted rows via the same diff.
pub async fn sync_countries(
    tx: &mut Transaction<'_, Postgres>,
    tables: &CountryTables,
    owner_id: Uuid,
    selections: &[CountrySelection],
) -> Result<(), sqlx::Error> {
    let submitted_countries: Vec<i32> = selections.iter().map(|s| s.country_id).collect();

    let country_diff = sync_int_join(
        tx,
        tables.countries,
        tables.owner_col,
        "country_id",
        owner_id,
        &submitted_countries,
    )
    .await?;

    if !country_diff.removed.is_empty() {
        let delete = format!(
            "DELETE FROM {} WHERE {} = $1 AND country_id = ANY($2)",
            tables.states, tables.owner_col
        );
        sqlx::query(&delete)
            .bind(owner_id)
            .bind(&country_diff.removed)
            .execute(&mut **tx)
            .await?;
    }

    for selection in selections {
        sync_state_overrides(tx, tables, owner_id, selection).await?;
    }

    Ok(())
}

async fn sync_state_overrides(
    tx: &mut Transaction<'_, Postgres>,
    tables: &CountryTables,
    owner_id: Uuid,
    selection: &CountrySelection,
) -> Result<(), sqlx::Error> {
    let select = format!(
        "SELECT state_id FROM {} WHERE {} = $1 AND country_id = $2",
        tables.states, tables.owner_col
    );
    let persisted: Vec<i32> = sqlx::query_scalar(&select)
        .bind(owner_id)
        .bind(selection.country_id)
        .fetch_all(&mut **tx)
        .await?;

    let diff = diff_ids(&selection.state_ids, &persisted);

    if !diff.removed.is_empty() {
        let delete = format!(
            "DELETE FROM {} WHERE {} = $1 AND country_id = $2 AND state_id = ANY($3)",
            tables.states, tables.owner_col
        );
        sqlx::query(&delete)
            .bind(owner_id)
            .bind(selection.country_id)
            .bind(&diff.removed)
            .execute(&mut **tx)
            .await?;
    }

    if !diff.added.is_empty() {
        let insert = format!(
            "INSERT INTO {} ({}, country_id, state_id) SELECT $1, $2, unnest($3::int[])",
            tables.states, tables.owner_col
        );
        sqlx::query(&insert)
            .bind(owner_id)
            .bind(selection.country_id)
            .bind(&diff.added)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

/// Fetch the persisted country selections (countries plus their state
/// overrides) for responses.
pub async fn load_country_selections(
    pool: &sqlx::PgPool,
    tables: &CountryTables,
    owner_id: Uuid,
) -> Result<Vec<CountrySelectionOut>, sqlx::Error> {
    let countries: Vec<i32> = sqlx::query_scalar(&format!(
        "SELECT country_id FROM {} WHERE {} = $1 ORDER BY country_id",
        tables.countries, tables.owner_col
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    let states: Vec<(i32, i32)> = sqlx::query_as(&format!(
        "SELECT country_id, state_id FROM {} WHERE {} = $1 ORDER BY country_id, state_id",
        tables.states, tables.owner_col
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(countries
        .into_iter()
        .map(|country_id| CountrySelectionOut {
            country_id,
            state_ids: states
                .iter()
                .filter(|(c, _)| *c == country_id)
                .map(|(_, s)| *s)
                .collect(),
        })
        .collect())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CountrySelectionOut {
    pub country_id: i32,
    pub state_ids: Vec<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_computes_added_and_removed() {
        let diff = diff_ids(&[2, 3], &[1, 2]);
        assert_eq!(diff.added, vec![3]);
        assert_eq!(diff.removed, vec![1]);
    }

    #[test]
    fn identical_sets_produce_empty_diff() {
        let diff = diff_ids(&[1, 2, 3], &[3, 2, 1]);
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn empty_submission_removes_everything() {
        let diff: IdDiff<i32> = diff_ids(&[], &[1, 2]);
        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, vec![1, 2]);
    }

    #[test]
    fn duplicate_submissions_are_deduped() {
        let diff = diff_ids(&[5, 5, 6], &[6]);
        assert_eq!(diff.added, vec![5]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn works_with_uuids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let diff = diff_ids(&[a], &[b]);
        assert_eq!(diff.added, vec![a]);
        assert_eq!(diff.removed, vec![b]);
    }
}
