//! Typed reads over an Automerge document, optionally at past heads.

use automerge::{ChangeHash, ObjId, ObjType, Prop, ReadDoc, ScalarValue, Value};

use crate::error::Result;

/// Read access to a document either at its current state or at `heads`.
///
/// Every helper returns `None` for a missing key or a value of another type,
/// so callers can treat malformed documents like absent data.
pub(crate) struct DocView<'a, D: ReadDoc> {
    doc: &'a D,
    heads: Option<&'a [ChangeHash]>,
}

impl<'a, D: ReadDoc> DocView<'a, D> {
    pub(crate) fn current(doc: &'a D) -> Self {
        Self { doc, heads: None }
    }

    pub(crate) fn at(doc: &'a D, heads: &'a [ChangeHash]) -> Self {
        Self {
            doc,
            heads: Some(heads),
        }
    }

    pub(crate) fn get<P: Into<Prop>>(
        &self,
        obj: &ObjId,
        prop: P,
    ) -> Result<Option<(Value<'a>, ObjId)>> {
        let found = match self.heads {
            Some(heads) => self.doc.get_at(obj, prop, heads)?,
            None => self.doc.get(obj, prop)?,
        };
        Ok(found)
    }

    pub(crate) fn keys(&self, obj: &ObjId) -> Vec<String> {
        match self.heads {
            Some(heads) => self.doc.keys_at(obj, heads).collect(),
            None => self.doc.keys(obj).collect(),
        }
    }

    pub(crate) fn text(&self, obj: &ObjId) -> Result<String> {
        let text = match self.heads {
            Some(heads) => self.doc.text_at(obj, heads)?,
            None => self.doc.text(obj)?,
        };
        Ok(text)
    }

    /// Id of the object of type `ty` stored at `key`.
    pub(crate) fn object(&self, obj: &ObjId, key: &str, ty: ObjType) -> Result<Option<ObjId>> {
        Ok(match self.get(obj, key)? {
            Some((Value::Object(found), id)) if found == ty => Some(id),
            _ => None,
        })
    }

    pub(crate) fn map(&self, obj: &ObjId, key: &str) -> Result<Option<ObjId>> {
        self.object(obj, key, ObjType::Map)
    }

    pub(crate) fn scalar(&self, obj: &ObjId, key: &str) -> Result<Option<ScalarValue>> {
        Ok(match self.get(obj, key)? {
            Some((Value::Scalar(value), _)) => Some(value.into_owned()),
            _ => None,
        })
    }

    pub(crate) fn bool(&self, obj: &ObjId, key: &str) -> Result<Option<bool>> {
        Ok(match self.scalar(obj, key)? {
            Some(ScalarValue::Boolean(b)) => Some(b),
            _ => None,
        })
    }

    pub(crate) fn int(&self, obj: &ObjId, key: &str) -> Result<Option<i64>> {
        Ok(match self.scalar(obj, key)? {
            Some(ScalarValue::Int(i)) => Some(i),
            Some(ScalarValue::Uint(u)) => i64::try_from(u).ok(),
            _ => None,
        })
    }

    pub(crate) fn string(&self, obj: &ObjId, key: &str) -> Result<Option<String>> {
        Ok(match self.scalar(obj, key)? {
            Some(ScalarValue::Str(s)) => Some(s.to_string()),
            _ => None,
        })
    }
}
