//! Per-entity integer properties: `ROOT.state[entity][prop] = Int`.

use automerge::transaction::Transactable;
use automerge::{ObjId, ObjType, ROOT, ReadDoc};

use super::doc_view::DocView;
use crate::error::Result;

pub(crate) const STATE: &str = "state";

pub(crate) fn get_state_int<D: ReadDoc>(
    view: &DocView<'_, D>,
    entity_id: &str,
    prop: &str,
) -> Result<Option<i64>> {
    let Some(state) = view.map(&ROOT, STATE)? else {
        return Ok(None);
    };
    let Some(entity) = view.map(&state, entity_id)? else {
        return Ok(None);
    };
    view.int(&entity, prop)
}

pub(crate) fn set_state_int<T: Transactable + ReadDoc>(
    tx: &mut T,
    entity_id: &str,
    prop: &str,
    value: i64,
) -> Result<()> {
    let state = child_map(tx, &ROOT, STATE)?;
    let entity = child_map(tx, &state, entity_id)?;
    tx.put(&entity, prop, value)?;
    Ok(())
}

fn child_map<T: Transactable + ReadDoc>(tx: &mut T, obj: &ObjId, key: &str) -> Result<ObjId> {
    let existing = DocView::current(&*tx).map(obj, key)?;
    match existing {
        Some(id) => Ok(id),
        None => Ok(tx.put_object(obj, key, ObjType::Map)?),
    }
}
