use std::time::Duration;

use serial_test::serial;
use tempfile::tempdir;

mod common;

#[test]
#[serial]
fn btree_round_trip_over_the_wire() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("data");
    let port = common::pick_free_port();
    let mut server = common::start_server("concurrency", &base, port);
    let mut client = common::LineClient::connect_with_retry(port, Duration::from_secs(8));

    assert_eq!(client.send("create btree table t"), "created table t");
    assert_eq!(client.send("insert 1 10 into t"), "ok");
    assert_eq!(client.send("insert 2 20 into t"), "ok");
    assert_eq!(client.send("insert 3 30 into t"), "ok");
    assert_eq!(client.send("find t 2"), "(2, 20)");
    assert_eq!(client.send("delete 2 from t"), "ok");
    assert_eq!(client.send("find t 2"), "not found");
    assert_eq!(client.send("select from t"), "[(1, 10), (3, 30)]");
    assert_eq!(client.send("transaction commit"), "ok");

    assert_eq!(client.send("insert 1 11 into t"), "duplicate key");

    common::kill_server(&mut server);
}

#[test]
#[serial]
fn hash_table_over_the_wire() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("data");
    let port = common::pick_free_port();
    let mut server = common::start_server("concurrency", &base, port);
    let mut client = common::LineClient::connect_with_retry(port, Duration::from_secs(8));

    assert_eq!(client.send("create hash table h"), "created table h");
    for key in 0..50 {
        assert_eq!(client.send(&format!("insert {key} {} into h", key * 3)), "ok");
    }
    assert_eq!(client.send("find h 17"), "(17, 51)");
    assert_eq!(client.send("update h 17 99"), "ok");
    assert_eq!(client.send("find h 17"), "(17, 99)");
    assert_eq!(client.send("transaction commit"), "ok");

    common::kill_server(&mut server);
}
