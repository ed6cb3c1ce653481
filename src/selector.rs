//! Named key selectors and the per-container selector registry.
//!
//! A [`KeySelector`] is a closure plus an identity. The identity is what the
//! co-partitioning optimizer reasons about: closures cannot be compared, names can.
//! The [`SelectorRegistry`] interns names into [`SelectorId`]s and records which
//! selectors *determine* which (equal keys under the child imply equal keys under
//! the parent). The registry lives inside a [`QueryContainer`](crate::QueryContainer)
//! and is dropped with it; nothing here is process-global.

use crate::error::{EngineError, Result};
use crate::type_token::TypeTag;
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::sync::{Arc, Mutex};

/// Interned identity of a named selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectorId(u32);

impl SelectorId {
    /// Return the underlying numeric value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Identity and key type of a selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorInfo {
    id: Option<SelectorId>,
    name: Arc<str>,
    key_type: TypeTag,
}

impl SelectorInfo {
    /// `None` for anonymous selectors.
    pub fn id(&self) -> Option<SelectorId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_type(&self) -> TypeTag {
        self.key_type
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }
}

/// A key extractor with an identity the planner can compare.
pub struct KeySelector<T, K> {
    info: SelectorInfo,
    f: Arc<dyn Fn(&T) -> K + Send + Sync>,
}

impl<T, K> Clone for KeySelector<T, K> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            f: Arc::clone(&self.f),
        }
    }
}

impl<T, K> Debug for KeySelector<T, K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.debug_struct("KeySelector").field("info", &self.info).finish()
    }
}

impl<T, K: 'static> KeySelector<T, K> {
    /// A selector with no identity. Never considered compatible with any partitioning.
    pub fn anonymous<F>(f: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self {
            info: SelectorInfo {
                id: None,
                name: Arc::from("<anonymous>"),
                key_type: TypeTag::of::<K>(),
            },
            f: Arc::new(f),
        }
    }

    pub fn info(&self) -> &SelectorInfo {
        &self.info
    }

    #[inline]
    pub fn key(&self, value: &T) -> K {
        (self.f)(value)
    }
}

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<Arc<str>, (SelectorId, TypeTag)>,
    // child -> parents it determines
    refines: HashMap<SelectorId, HashSet<SelectorId>>,
}

/// Interning cache for selector identities, owned by a query container.
#[derive(Default)]
pub struct SelectorRegistry {
    inner: Mutex<RegistryInner>,
}

impl SelectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&self, name: &str, key_type: TypeTag) -> Result<SelectorInfo> {
        let mut g = self.inner.lock().unwrap();
        if let Some((id, existing)) = g.by_name.get(name) {
            if *existing != key_type {
                return Err(EngineError::invalid(format!(
                    "selector `{name}` already registered with key type {existing}, not {key_type}"
                )));
            }
            return Ok(SelectorInfo {
                id: Some(*id),
                name: Arc::from(name),
                key_type,
            });
        }
        let id = SelectorId(u32::try_from(g.by_name.len()).map_err(|_| {
            EngineError::invalid("selector registry exhausted")
        })?);
        let name: Arc<str> = Arc::from(name);
        g.by_name.insert(Arc::clone(&name), (id, key_type));
        Ok(SelectorInfo {
            id: Some(id),
            name,
            key_type,
        })
    }

    /// Register (or look up) the selector `name` and bind `f` to it.
    ///
    /// # Errors
    /// `InvalidConfig` if `name` was already registered with a different key type.
    pub fn selector<T, K, F>(&self, name: &str, f: F) -> Result<KeySelector<T, K>>
    where
        K: 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        let info = self.intern(name, TypeTag::of::<K>())?;
        Ok(KeySelector { info, f: Arc::new(f) })
    }

    /// Register `name` and declare that it determines `parent`: any two rows with equal
    /// keys under the new selector have equal keys under `parent`.
    ///
    /// # Errors
    /// `InvalidConfig` if `parent` is anonymous or the name is already bound to another type.
    pub fn refining<T, K, F>(&self, name: &str, parent: &SelectorInfo, f: F) -> Result<KeySelector<T, K>>
    where
        K: 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        let sel = self.selector(name, f)?;
        self.declare_refinement(sel.info(), parent)?;
        Ok(sel)
    }

    /// Record that `child` determines `parent`.
    ///
    /// # Errors
    /// `InvalidConfig` if either side is anonymous.
    pub fn declare_refinement(&self, child: &SelectorInfo, parent: &SelectorInfo) -> Result<()> {
        let (Some(c), Some(p)) = (child.id, parent.id) else {
            return Err(EngineError::invalid(
                "refinement requires two named selectors",
            ));
        };
        let mut g = self.inner.lock().unwrap();
        g.refines.entry(c).or_default().insert(p);
        Ok(())
    }

    /// Whether equal keys under `a` imply equal keys under `b`.
    ///
    /// True when both are the same named selector, or `a` reaches `b` through declared
    /// refinements. Anonymous selectors determine nothing.
    pub fn determines(&self, a: &SelectorInfo, b: &SelectorInfo) -> bool {
        let (Some(from), Some(to)) = (a.id, b.id) else {
            return false;
        };
        if from == to {
            return true;
        }
        let g = self.inner.lock().unwrap();
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(cur) = stack.pop() {
            if !seen.insert(cur) {
                continue;
            }
            if let Some(parents) = g.refines.get(&cur) {
                if parents.contains(&to) {
                    return true;
                }
                stack.extend(parents.iter().copied());
            }
        }
        false
    }

    /// Number of distinct names interned so far.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
