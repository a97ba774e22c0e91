use crate::store::operations::completions::UnitView;
use crate::store::operations::units::Unit;
use crate::store::{keys, Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_variant_index_backfill", m002_variant_index_backfill),
        ("003_unit_views_by_course", m003_unit_views_by_course),
    ]
}

/// 执行所有未应用的迁移。
///
/// 每个迁移必须幂等：进程可能在迁移完成后、版本写入前退出，重启会再次执行。
/// 版本号只允许前进。
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;

    for (index, (name, func)) in migrations().iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("corrupt version marker ({} bytes)", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {current} to {version}"),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

// 旧数据中缺失唯一索引的变体单元补写索引；已存在的索引保持不变
fn m002_variant_index_backfill(store: &Store) -> Result<(), StoreError> {
    let mut restored = 0_u32;
    for item in store.units.iter() {
        let (_, value) = item?;
        let unit: Unit = Store::deserialize(&value)?;
        let Some((derived_from, kind)) = unit.variant_of() else {
            continue;
        };

        let index_key = keys::variant_index_key(&unit.course_id, derived_from, kind.as_str())?;
        let previous = store.variant_index.compare_and_swap(
            index_key.as_bytes(),
            None as Option<&[u8]>,
            Some(unit.id.as_bytes()),
        )?;
        if previous.is_ok() {
            restored += 1;
        }
    }

    if restored > 0 {
        tracing::info!(restored, "Variant index entries restored");
    }
    Ok(())
}

// 旧的浏览记录键为 learner:unit，改写为 learner:course:unit；找不到单元的记录直接丢弃
fn m003_unit_views_by_course(store: &Store) -> Result<(), StoreError> {
    let mut moved = 0_u32;
    let mut dropped = 0_u32;
    for item in store.unit_views.iter() {
        let (key, value) = item?;
        let legacy_key = String::from_utf8_lossy(&key).into_owned();
        if legacy_key.split(':').count() != 2 {
            continue;
        }

        let mut view: UnitView = Store::deserialize(&value)?;
        match store.get_unit(&view.unit_id)? {
            Some(unit) => {
                view.course_id = unit.course_id;
                let new_key = keys::unit_view_key(&view.learner_id, &view.course_id, &view.unit_id)?;
                // 新键已存在时保留新记录
                let _ = store.unit_views.compare_and_swap(
                    new_key.as_bytes(),
                    None as Option<&[u8]>,
                    Some(Store::serialize(&view)?),
                )?;
                moved += 1;
            }
            None => dropped += 1,
        }
        store.unit_views.remove(&key)?;
    }

    if moved > 0 || dropped > 0 {
        tracing::info!(moved, dropped, "Unit views re-keyed by course");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::store::operations::courses::tests::seed_course;
    use crate::store::operations::courses::Container;
    use crate::store::operations::units::{UnitDraft, VariantKind};

    #[test]
    fn migration_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        run(&store).unwrap();
        let first = get_current_version(&store).unwrap();
        run(&store).unwrap();
        let second = get_current_version(&store).unwrap();

        assert_eq!(first, 3);
        assert_eq!(second, 3);
    }

    #[test]
    fn downgrade_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db2");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        set_version(&store, 3).unwrap();
        let err = set_version(&store, 2).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
    }

    #[test]
    fn backfill_restores_missing_variant_index() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db3").to_str().unwrap()).unwrap();
        let tree = seed_course(&store, &[1]);
        let original = &tree.units[0];
        let host = Container::remedial_for(&tree.containers[0]);
        let draft = UnitDraft {
            title: "easier".to_string(),
            body: "body".to_string(),
            description: String::new(),
            quiz: None,
        };
        let variant = Unit::new_variant(original, VariantKind::Simplified, &host, draft).unwrap();
        let variant = store.insert_variant_unit(&host, &variant).unwrap();

        store.variant_index.clear().unwrap();
        assert!(store.find_simplified_variant(original).unwrap().is_none());

        m002_variant_index_backfill(&store).unwrap();
        let found = store.find_simplified_variant(original).unwrap().unwrap();
        assert_eq!(found.id, variant.id);
    }

    #[test]
    fn legacy_unit_views_move_under_their_course() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db4").to_str().unwrap()).unwrap();
        let tree = seed_course(&store, &[1]);
        let unit = &tree.units[0];
        let now = chrono::Utc::now();
        let legacy = serde_json::json!({
            "learnerId": "l1",
            "unitId": unit.id,
            "viewCount": 3,
            "firstViewedAt": now,
            "lastViewedAt": now,
        });
        store
            .unit_views
            .insert(format!("l1:{}", unit.id).as_bytes(), serde_json::to_vec(&legacy).unwrap())
            .unwrap();
        store
            .unit_views
            .insert("l1:gone".as_bytes(), serde_json::to_vec(&legacy).unwrap())
            .unwrap();

        m003_unit_views_by_course(&store).unwrap();
        m003_unit_views_by_course(&store).unwrap();

        assert_eq!(store.unit_views.len(), 1);
        let view = store.get_unit_view("l1", &tree.course.id, &unit.id).unwrap().unwrap();
        assert_eq!(view.view_count, 3);
        assert_eq!(view.course_id, tree.course.id);
        assert_eq!(store.viewed_units("l1", &tree.course.id).unwrap(), vec![unit.id.clone()]);
    }
}
