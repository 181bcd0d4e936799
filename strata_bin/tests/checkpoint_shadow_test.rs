use std::time::Duration;

use serial_test::serial;
use tempfile::tempdir;

mod common;

#[test]
#[serial]
fn shadow_copy_restores_a_corrupted_data_directory() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("data");

    let port = common::pick_free_port();
    let mut server = common::start_server("recovery", &base, port);
    let mut client = common::LineClient::connect_with_retry(port, Duration::from_secs(8));
    assert_eq!(client.send("create btree table t"), "created table t");
    assert_eq!(client.send("insert 9 99 into t"), "ok");
    assert_eq!(client.send("transaction commit"), "ok");
    assert_eq!(client.send("checkpoint"), "ok");
    common::kill_server(&mut server);

    // Corrupt the live directory: the table files vanish, the log and the
    // shadow copy stay.
    std::fs::remove_file(base.join("t.btree")).unwrap();
    std::fs::remove_file(base.join("t.meta")).unwrap();
    assert!(dir.path().join("data-recovery").join("t.btree").exists());

    let port = common::pick_free_port();
    let mut server = common::start_server("recovery", &base, port);
    let mut client = common::LineClient::connect_with_retry(port, Duration::from_secs(8));
    assert_eq!(client.send("find t 9"), "(9, 99)");
    common::kill_server(&mut server);
}
