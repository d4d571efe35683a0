#![allow(missing_docs)]

use std::fs;

use tempfile::tempdir;
use tuplestore::{
    storage::btree::TreeFiles,
    types::{Result, StoreError},
    NodeId, Store, StoreOptions, Term, Tuple,
};

fn id(v: i64) -> NodeId {
    NodeId::create(v)
}

fn options_toml(dir: &std::path::Path, extra: &str) -> String {
    format!(
        "location = {:?}\norder = 3\nrecord_block_size = 200\nverify_on_open = true\n{extra}",
        dir.display().to_string()
    )
}

#[test]
fn contents_survive_close_and_reopen() -> Result<()> {
    let dir = tempdir()?;
    let options = StoreOptions::from_toml_str(&options_toml(dir.path(), ""))?;

    let mut store = Store::open(options.clone())?;
    for n in 0..200 {
        store.add(&Tuple::triple(id(n), id(n % 7), id(1000 - n)))?;
        store.add(&Tuple::quad(id(n % 3), id(n), id(1), id(2)))?;
    }
    for n in (0..200).step_by(5) {
        assert!(store.delete(&Tuple::triple(id(n), id(n % 7), id(1000 - n)))?);
    }
    store.close()?;

    let store = Store::open(options)?;
    assert_eq!(store.triple_count()?, 160);
    assert_eq!(store.quad_count()?, 200);
    assert!(store.contains(&Tuple::triple(id(1), id(1), id(999)))?);
    assert!(!store.contains(&Tuple::triple(id(5), id(5), id(995)))?);

    let graph_two: Vec<_> = store
        .find(&Tuple::quad(id(2), NodeId::ANY, NodeId::ANY, NodeId::ANY))?
        .collect::<Result<_>>()?;
    assert_eq!(graph_two.len(), 66);
    Ok(())
}

#[test]
fn options_load_from_a_toml_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("store.toml");
    fs::write(&path, options_toml(dir.path(), "quad_indexes = []\n"))?;
    let store = Store::open(StoreOptions::from_toml_file(&path)?)?;
    assert!(store.quads().is_none());
    assert!(TreeFiles::new(dir.path(), "SPO").state.exists());
    assert!(!TreeFiles::new(dir.path(), "GSPO").state.exists());
    Ok(())
}

#[test]
fn reopening_with_another_block_size_fails() -> Result<()> {
    let dir = tempdir()?;
    let options = StoreOptions::from_toml_str(&options_toml(dir.path(), ""))?;
    Store::open(options.clone())?.close()?;

    let mut other = options;
    other.record_block_size = Some(400);
    match Store::open(other) {
        Err(StoreError::BlockSizeMismatch { expected, found }) => {
            assert_eq!(expected, 400);
            assert_eq!(found, 200);
        }
        Err(err) => panic!("unexpected error {err}"),
        Ok(_) => panic!("block size change was accepted"),
    }
    Ok(())
}

#[test]
fn damaged_tree_state_is_reported() -> Result<()> {
    let dir = tempdir()?;
    let options = StoreOptions::from_toml_str(&options_toml(dir.path(), "quad_indexes = []\n"))?;
    let mut store = Store::open(options.clone())?;
    store.add(&Tuple::triple(id(1), id(2), id(3)))?;
    store.close()?;

    let state = TreeFiles::new(dir.path(), "POS").state;
    let mut bytes = fs::read(&state)?;
    bytes[20] ^= 0xff;
    fs::write(&state, bytes)?;
    assert!(matches!(Store::open(options), Err(StoreError::Corruption(_))));
    Ok(())
}

#[test]
fn dictionary_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let options = StoreOptions::from_toml_str(&options_toml(dir.path(), "quad_indexes = []\n"))?;
    let iri = |name: &str| Term::iri(format!("http://example/{name}"));

    let mut store = Store::open(options.clone())?;
    assert!(store.add_terms(&[iri("alice"), iri("knows"), iri("bob")])?);
    store.close()?;

    let mut store = Store::open(options)?;
    assert!(store.add_terms(&[iri("carol"), iri("likes"), iri("dave")])?);
    assert_eq!(store.triple_count()?, 2);

    let alice = store.pattern(&[Some(iri("alice")), None, None])?.unwrap();
    let found: Vec<_> = store.find(&alice)?.collect::<Result<_>>()?;
    assert_eq!(found.len(), 1);
    assert_eq!(store.terms(&found[0])?, vec![iri("alice"), iri("knows"), iri("bob")]);

    let carol = store.pattern(&[Some(iri("carol")), None, None])?.unwrap();
    let found: Vec<_> = store.find(&carol)?.collect::<Result<_>>()?;
    assert_eq!(found.len(), 1);
    assert_eq!(store.terms(&found[0])?, vec![iri("carol"), iri("likes"), iri("dave")]);
    Ok(())
}
