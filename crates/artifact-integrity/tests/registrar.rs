//! End-to-end registrar flows against scripted stand-ins for the real tools.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use artifact_integrity::{
    registrar::RegistrarError, FailureKind, IntegrityConfig, IntegrityError, IntegrityKernel,
    RegistrarConfig, RegistrationStatus, RentalRequest, StateDict, Tensor,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn kernel(dir: &Path, register: &str, rent: &str, timeout: Duration) -> IntegrityKernel {
    let registrar = RegistrarConfig::default()
        .interpreter(None)
        .register_script(write_script(dir, "register_model", register))
        .rent_script(write_script(dir, "rent_model", rent))
        .timeout(timeout);
    IntegrityKernel::new(IntegrityConfig::default().registrar(registrar))
}

/// Echoes its arguments back the way the real register tool reports success.
const ECHO_REGISTER: &str = r#"
echo "Using RPC http://127.0.0.1:8899"
echo "warning: IDL cache miss" >&2
printf '{"success":true,"txid":"tx-%s","model_pda":"pda-%s","program_id":"Prog111","wallet":"Wal111","uri":"%s","price":"%s"}\n' "$1" "$3" "$2" "$3"
"#;

#[test]
fn test_publish_checkpoint() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("model.pt");
    std::fs::write(&artifact, b"serialized checkpoint").unwrap();
    let state = StateDict::new()
        .with("weight", Tensor::from_f32(vec![2, 2], &[1.0, 2.0, 3.0, 4.0]))
        .with("bias", Tensor::from_f32(vec![2], &[0.5, -0.5]));

    let kernel = kernel(dir.path(), ECHO_REGISTER, "exit 1", Duration::from_secs(10));
    let publication = kernel.publish(&artifact, Some(&state), 2500, None).unwrap();

    let hash = "00570a598fa80888c5e697cb44948d2b1f366ee955f6c98f572f7bbed0f9636f";
    assert_eq!(publication.fingerprint.content_hash.to_hex(), hash);

    let receipt = publication.registration.receipt().unwrap();
    assert_eq!(receipt.txid, format!("tx-{}", hash));
    assert_eq!(receipt.model_address, "pda-2500");
    assert_eq!(receipt.program_id.as_deref(), Some("Prog111"));
    assert_eq!(receipt.payload["uri"], publication.storage_locator.as_str());

    let json = serde_json::to_value(&publication).unwrap();
    assert_eq!(json["registration"]["status"], "registered");
}

#[test]
fn test_publish_reports_tool_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("model.onnx");
    std::fs::write(&artifact, b"graph").unwrap();

    let kernel = kernel(
        dir.path(),
        r#"echo '{"success":false,"error":"wallet file not found: /root/.config/solana/id.json","stack":"Error: ..."}'; exit 1"#,
        "exit 1",
        Duration::from_secs(10),
    );
    let key = Path::new("/root/.config/solana/id.json");
    let publication = kernel.publish(&artifact, None, 0, Some(key)).unwrap();

    match &publication.registration {
        RegistrationStatus::Failed { error, failure } => {
            assert!(error.contains("wallet file not found"));
            assert!(error.chars().count() <= 1000);
            assert_eq!(failure.as_ref().unwrap().kind, FailureKind::Exit { code: Some(1) });
        }
        RegistrationStatus::Registered(_) => panic!("expected failure"),
    }
}

#[test]
fn test_clean_exit_logical_failure() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = kernel(
        dir.path(),
        "exit 1",
        r#"echo "fetching model account"; echo '{"success":false,"error":"dup"}'"#,
        Duration::from_secs(10),
    );
    let fp = kernel.fingerprint_reader(std::io::Cursor::new(b"abc"), None).unwrap();

    let err = kernel.rent(&RentalRequest::new(fp.content_hash)).unwrap_err();
    match err {
        IntegrityError::Registrar(RegistrarError::Outcome(failure)) => {
            assert_eq!(failure.kind, FailureKind::Logical);
            assert_eq!(failure.reported_error(), Some("dup"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_rent_async_times_out() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let kernel = kernel(
        dir.path(),
        "exit 1",
        "echo 'connecting'; exec sleep 30",
        Duration::from_millis(300),
    );
    let fp = kernel.fingerprint_reader(std::io::Cursor::new(b"abc"), None).unwrap();

    let start = Instant::now();
    let err = kernel.rent_async(RentalRequest::new(fp.content_hash)).await.unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(10));

    let IntegrityError::Registrar(err) = err else {
        panic!("expected registrar error");
    };
    let failure = err.failure().unwrap();
    assert!(failure.is_timeout());
    assert!(failure.stdout.contains("connecting"));
}

#[tokio::test]
async fn test_publish_async() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("weights.bin");
    std::fs::write(&artifact, vec![1u8; 4096]).unwrap();

    let kernel = kernel(dir.path(), ECHO_REGISTER, "exit 1", Duration::from_secs(10));
    let publication = kernel
        .publish_async(artifact.clone(), None, 1, None)
        .await
        .unwrap();
    assert!(publication.registration.is_registered());
    assert_eq!(publication.fingerprint.size_bytes, 4096);
}
