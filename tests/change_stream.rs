//! Change stream (put) tests
//!
//! LDIF input is fed in small chunks so records straddle chunk
//! boundaries; the directory's write log shows what was applied.

mod common;

use std::time::Duration;

use bytes::Bytes;
use common::*;
use futures::stream::{self, StreamExt};
use ldap_fs::directory::{ProtocolError, ResultCode};
use ldap_fs::error::{ErrorKind, LdapFsError};
use tokio_test::assert_ok;

const PEOPLE: &str = "ou=people,dc=example,dc=org";
const ALICE: &str = "cn=alice,ou=people,dc=example,dc=org";

fn put_request() -> ldap_fs::worker::Request {
    request(&format!("ldap://localhost/{}", PEOPLE))
}

#[tokio::test]
async fn test_empty_stream_applies_nothing() {
    let dir = sample_directory();
    let mut worker = worker(&dir);

    let applied = worker
        .put(&put_request(), ldif_stream("", 16), false)
        .await
        .unwrap();

    assert_eq!(applied, 0);
    assert!(dir.writes().is_empty());
}

#[tokio::test]
async fn test_add_records_in_small_chunks() {
    let dir = sample_directory();
    let mut worker = worker(&dir);
    let ldif = "version: 1\n\
                # two new people\n\
                dn: cn=carol,ou=people,dc=example,dc=org\n\
                objectClass: person\n\
                cn: carol\n\
                description: a long\n  folded value\n\
                \n\
                dn: cn=dave,ou=people,dc=example,dc=org\n\
                changetype: add\n\
                cn: dave\n";

    let applied = worker
        .put(&put_request(), ldif_stream(ldif, 3), false)
        .await
        .unwrap();

    assert_eq!(applied, 2);
    assert_eq!(
        dir.writes(),
        vec![
            Op::Add("cn=carol,ou=people,dc=example,dc=org".to_string()),
            Op::Add("cn=dave,ou=people,dc=example,dc=org".to_string()),
        ]
    );
    let carol = dir.entry("cn=carol,ou=people,dc=example,dc=org").unwrap();
    assert_eq!(
        carol.values("description"),
        Some(&[b"a long folded value".to_vec()][..])
    );
}

/// A malformed line aborts the stream; records before it stay applied
#[tokio::test]
async fn test_invalid_line_aborts_with_line_number() {
    let dir = sample_directory();
    let mut worker = worker(&dir);
    let ldif = "dn: cn=carol,ou=people,dc=example,dc=org\n\
                cn: carol\n\
                \n\
                dn: cn=dave,ou=people,dc=example,dc=org\n\
                this line has no separator\n\
                \n\
                dn: cn=erin,ou=people,dc=example,dc=org\n\
                cn: erin\n";

    let err = worker
        .put(&put_request(), ldif_stream(ldif, 7), false)
        .await
        .unwrap_err();

    match &err {
        LdapFsError::InvalidInput { line, .. } => assert_eq!(*line, 5),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.to_string().contains("line 5"));
    assert_eq!(
        dir.writes(),
        vec![Op::Add("cn=carol,ou=people,dc=example,dc=org".to_string())]
    );
    assert!(!dir.contains("cn=erin,ou=people,dc=example,dc=org"));
}

#[tokio::test]
async fn test_incomplete_record_at_end_is_a_parser_failure() {
    let dir = sample_directory();
    let mut worker = worker(&dir);

    let err = worker
        .put(
            &put_request(),
            ldif_stream("dn: cn=carol,ou=people,dc=example,dc=org\n", 64),
            false,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(dir.writes().is_empty());
}

/// With overwrite an existing entry is deleted once and added once
#[tokio::test]
async fn test_add_overwrite_replaces_existing_entry() {
    let dir = sample_directory();
    let mut worker = worker(&dir);
    let ldif = format!("dn: {}\nobjectClass: person\ncn: alice\nsn: Pleasance\n", ALICE);

    let applied = worker
        .put(&put_request(), ldif_stream(&ldif, 5), true)
        .await
        .unwrap();

    assert_eq!(applied, 1);
    assert_eq!(
        dir.writes(),
        vec![
            Op::Add(ALICE.to_string()),
            Op::Delete(ALICE.to_string()),
            Op::Add(ALICE.to_string()),
        ]
    );
    let alice = dir.entry(ALICE).unwrap();
    assert_eq!(alice.values("sn"), Some(&[b"Pleasance".to_vec()][..]));
    assert!(worker.is_connected());
}

#[tokio::test]
async fn test_add_without_overwrite_reports_existing_entry() {
    let dir = sample_directory();
    let mut worker = worker(&dir);
    let ldif = format!("dn: {}\ncn: alice\n", ALICE);

    let err = worker
        .put(&put_request(), ldif_stream(&ldif, 64), false)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FileAlreadyExists);
    assert!(err.to_string().contains("entry exists"));
    assert_eq!(dir.writes(), vec![Op::Add(ALICE.to_string())]);
    assert!(!worker.is_connected());
}

#[tokio::test]
async fn test_modify_rename_and_delete() {
    let dir = sample_directory();
    let mut worker = worker(&dir);
    let ldif = format!(
        "dn: {alice}\n\
         changetype: modify\n\
         replace: sn\n\
         sn: Hargreaves\n\
         -\n\
         add: mail\n\
         mail: alice@example.org\n\
         mail:: YWxpY2VAZXhhbXBsZS5uZXQ=\n\
         -\n\
         \n\
         dn: cn=bob,{people}\n\
         changetype: modrdn\n\
         newrdn: cn=robert\n\
         deleteoldrdn: 1\n\
         \n\
         dn: cn=admins,ou=groups,dc=example,dc=org\n\
         changetype: delete\n",
        alice = ALICE,
        people = PEOPLE
    );

    let applied = worker
        .put(&put_request(), ldif_stream(&ldif, 11), false)
        .await
        .unwrap();

    assert_eq!(applied, 3);
    assert_eq!(
        dir.writes(),
        vec![
            Op::Modify(ALICE.to_string()),
            Op::Rename {
                dn: format!("cn=bob,{}", PEOPLE),
                new_rdn: "cn=robert".to_string(),
            },
            Op::Delete("cn=admins,ou=groups,dc=example,dc=org".to_string()),
        ]
    );

    let alice = dir.entry(ALICE).unwrap();
    assert_eq!(alice.values("sn"), Some(&[b"Hargreaves".to_vec()][..]));
    assert_eq!(
        alice.values("mail"),
        Some(
            &[
                b"alice@example.org".to_vec(),
                b"alice@example.net".to_vec()
            ][..]
        )
    );
    assert!(dir.contains(&format!("cn=robert,{}", PEOPLE)));
    assert!(!dir.contains("cn=admins,ou=groups,dc=example,dc=org"));
}

/// A failing operation stops the stream; later records are not applied
#[tokio::test]
async fn test_apply_failure_stops_stream() {
    let dir = sample_directory().fail_write(
        ALICE,
        ProtocolError::new(ResultCode::INSUFFICIENT_ACCESS, "read only"),
    );
    let mut worker = worker(&dir);
    let ldif = format!(
        "dn: {}\nchangetype: delete\n\ndn: cn=bob,{}\nchangetype: delete\n",
        ALICE, PEOPLE
    );

    let err = worker
        .put(&put_request(), ldif_stream(&ldif, 4), false)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert_eq!(dir.writes(), vec![Op::Delete(ALICE.to_string())]);
    assert!(dir.contains(&format!("cn=bob,{}", PEOPLE)));
}

/// Control lines accumulate and travel with the following operations
#[tokio::test]
async fn test_control_lines_are_accepted() {
    let dir = sample_directory();
    let mut worker = worker(&dir);
    let ldif = format!(
        "dn: cn=bob,{}\ncontrol: 1.2.840.113556.1.4.805 true\nchangetype: delete\n",
        PEOPLE
    );

    let applied = assert_ok!(
        worker
            .put(&put_request(), ldif_stream(&ldif, 2), false)
            .await
    );

    assert_eq!(applied, 1);
    assert!(!dir.contains(&format!("cn=bob,{}", PEOPLE)));
}

#[tokio::test]
async fn test_crlf_input() {
    let dir = sample_directory();
    let mut worker = worker(&dir);
    let ldif = "dn: cn=carol,ou=people,dc=example,dc=org\r\ncn: carol\r\n\r\n";

    let applied = assert_ok!(
        worker
            .put(&put_request(), ldif_stream(ldif, 1), false)
            .await
    );

    assert_eq!(applied, 1);
    assert!(dir.contains("cn=carol,ou=people,dc=example,dc=org"));
}

/// A record ends at its blank line, even if the writer then goes quiet
#[tokio::test]
async fn test_record_applied_before_stream_ends() {
    let dir = sample_directory();
    let mut worker = worker(&dir);
    let first = format!("dn: cn=bob,{}\nchangetype: delete\n\n", PEOPLE);
    let input = stream::iter(vec![Ok(Bytes::from(first))]).chain(stream::pending());

    let waited = tokio::time::timeout(
        Duration::from_millis(200),
        worker.put(&put_request(), input, false),
    )
    .await;

    assert!(waited.is_err(), "stream never ends, put must still be waiting");
    assert_eq!(dir.writes(), vec![Op::Delete(format!("cn=bob,{}", PEOPLE))]);
}
