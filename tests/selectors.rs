//! Tests for the selector registry: identity by name, key-type checks and refinements.

use anyhow::Result;
use ironstream::testing::*;
use ironstream::*;

#[test]
fn test_same_name_yields_the_same_identity() -> Result<()> {
    let c = TestContainer::new();
    let from_views = c.selector("user", |v: &PageView| v.user)?;
    let from_buys = c.selector("user", |p: &Purchase| p.user)?;

    assert!(!from_views.info().is_anonymous());
    assert_eq!(from_views.info().id(), from_buys.info().id());
    assert_eq!(from_views.info().name(), "user");
    assert_eq!(from_views.info().key_type(), TypeTag::of::<u32>());
    assert!(c.selectors().determines(from_views.info(), from_buys.info()));
    assert_eq!(c.selectors().len(), 1);
    Ok(())
}

#[test]
fn test_distinct_names_get_distinct_identities() -> Result<()> {
    let c = TestContainer::new();
    let user = c.selector("user", |v: &PageView| v.user)?;
    let page = c.selector("page", |v: &PageView| v.page.clone())?;

    assert_ne!(user.info().id(), page.info().id());
    assert!(!c.selectors().determines(user.info(), page.info()));
    assert_eq!(c.selectors().len(), 2);

    let view = PageView {
        user: 7,
        page: "home".to_string(),
    };
    assert_eq!(user.key(&view), 7);
    assert_eq!(page.key(&view), "home");
    Ok(())
}

#[test]
fn test_name_reused_with_another_key_type_is_rejected() -> Result<()> {
    let c = TestContainer::new();
    c.selector("user", |v: &PageView| v.user)?;

    let clash = c.selector("user", |v: &PageView| u64::from(v.user));
    match clash {
        Err(EngineError::InvalidConfig(msg)) => {
            assert!(msg.contains("already registered with key type"), "{msg}");
            assert!(msg.contains("u32") && msg.contains("u64"), "{msg}");
        }
        other => panic!("expected InvalidConfig, got {:?}", other.map(|s| s.info().name().to_string())),
    }
    assert_eq!(c.selectors().len(), 1);
    Ok(())
}

#[test]
fn test_refinements_are_transitive() -> Result<()> {
    let c = TestContainer::new();
    let region = c.selector("region", |r: &(u32, u32, u32)| r.0)?;
    let store = c.refining("store", region.info(), |r: &(u32, u32, u32)| (r.0, r.1))?;
    let till = c.refining("till", store.info(), |r: &(u32, u32, u32)| *r)?;

    let reg = c.selectors();
    assert!(reg.determines(till.info(), store.info()));
    assert!(reg.determines(store.info(), region.info()));
    assert!(reg.determines(till.info(), region.info()));
    assert!(reg.determines(region.info(), region.info()));

    assert!(!reg.determines(region.info(), store.info()));
    assert!(!reg.determines(store.info(), till.info()));
    Ok(())
}

#[test]
fn test_refinement_cycles_terminate() -> Result<()> {
    let c = TestContainer::new();
    let a = c.selector("a", |r: &(u32, u32)| r.0)?;
    let b = c.selector("b", |r: &(u32, u32)| r.0 * 2)?;
    let other = c.selector("other", |r: &(u32, u32)| r.1)?;
    c.selectors().declare_refinement(a.info(), b.info())?;
    c.selectors().declare_refinement(b.info(), a.info())?;

    assert!(c.selectors().determines(a.info(), b.info()));
    assert!(c.selectors().determines(b.info(), a.info()));
    assert!(!c.selectors().determines(a.info(), other.info()));
    Ok(())
}

#[test]
fn test_anonymous_selectors_determine_nothing() -> Result<()> {
    let c = TestContainer::new();
    let named = c.selector("user", |r: &(u32, u32)| r.0)?;
    let anon = KeySelector::anonymous(|r: &(u32, u32)| r.0);

    assert!(anon.info().is_anonymous());
    assert_eq!(anon.info().id(), None);
    assert!(!c.selectors().determines(anon.info(), anon.info()));
    assert!(!c.selectors().determines(anon.info(), named.info()));
    assert!(!c.selectors().determines(named.info(), anon.info()));

    let declared = c.selectors().declare_refinement(anon.info(), named.info());
    assert!(matches!(declared, Err(EngineError::InvalidConfig(msg)) if msg.contains("two named selectors")));

    let refined = c.refining("user+value", anon.info(), |r: &(u32, u32)| *r);
    assert!(matches!(refined, Err(EngineError::InvalidConfig(_))));
    Ok(())
}

#[test]
fn test_each_container_owns_its_registry() -> Result<()> {
    let first = TestContainer::new();
    let second = TestContainer::new();
    let a = first.selector("user", |v: &PageView| v.user)?;
    let parent = first.selector("region", |v: &PageView| v.user / 10)?;
    first.selectors().declare_refinement(a.info(), parent.info())?;

    // The same name may carry another key type in a different container.
    let b = second.selector("user", |v: &PageView| v.page.clone())?;
    assert_eq!(b.info().key_type(), TypeTag::of::<String>());
    assert!(!second.selectors().is_empty());
    assert_eq!(second.selectors().len(), 1);
    assert_eq!(first.selectors().len(), 2);

    let fresh = SelectorRegistry::new();
    assert!(fresh.is_empty());
    Ok(())
}
