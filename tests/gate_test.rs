use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tabscrub::error::ScrubError;
use tabscrub::gate::PaymentGate;
use tabscrub::store::{DiskFileStore, FileStore};
use tabscrub::table::{Cell, Table};
use tabscrub::verify::{PaymentVerifier, VerifiedCharge};
use tempfile::tempdir;

/// Verifier stub that confirms every charge and echoes a fixed metadata
/// file key, standing in for the external gateway.
struct ScriptedVerifier {
    file_key: Option<String>,
}

#[async_trait]
impl PaymentVerifier for ScriptedVerifier {
    async fn verify(&self, reference: &str) -> tabscrub::error::Result<VerifiedCharge> {
        Ok(VerifiedCharge {
            reference: reference.to_string(),
            file_key: self.file_key.clone(),
        })
    }
}

fn sample_table() -> Table {
    Table::new(
        vec!["name".into(), "price".into()],
        vec![vec![Cell::Str("bob".into()), Cell::Num(10.0)]],
    )
    .unwrap()
}

#[tokio::test]
async fn verified_payment_mints_token_for_the_paid_file() -> Result<()> {
    let dir = tempdir()?;
    let store: Arc<DiskFileStore> = Arc::new(DiskFileStore::new(dir.path())?);
    let key = store.save(&sample_table()).await?;

    let gate = PaymentGate::new(
        store.clone(),
        Arc::new(ScriptedVerifier { file_key: Some(key.clone()) }),
    );

    let token = gate
        .notify("payment-succeeded", &json!({"reference": "ref_1"}))
        .await?;

    let bytes = gate.redeem(&token).await?;
    assert_eq!(bytes, sample_table().to_csv_bytes()?);

    // Redeeming consumed the stored file as well as the token.
    assert!(!store.contains(&key).await);
    Ok(())
}

#[tokio::test]
async fn double_redeem_fails_with_unknown_token() -> Result<()> {
    let dir = tempdir()?;
    let store: Arc<DiskFileStore> = Arc::new(DiskFileStore::new(dir.path())?);
    let key = store.save(&sample_table()).await?;

    let gate = PaymentGate::new(
        store.clone(),
        Arc::new(ScriptedVerifier { file_key: Some(key) }),
    );
    let token = gate
        .notify("payment-succeeded", &json!({"reference": "ref_1"}))
        .await?;

    assert!(gate.redeem(&token).await.is_ok());
    let err = gate.redeem(&token).await.unwrap_err();
    assert!(matches!(err, ScrubError::Forbidden(_)));
    Ok(())
}

#[tokio::test]
async fn non_payment_event_changes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let store: Arc<DiskFileStore> = Arc::new(DiskFileStore::new(dir.path())?);
    let key = store.save(&sample_table()).await?;

    let gate = PaymentGate::new(
        store.clone(),
        Arc::new(ScriptedVerifier { file_key: Some(key.clone()) }),
    );

    let err = gate
        .notify("subscription.create", &json!({"reference": "ref_1"}))
        .await
        .unwrap_err();

    assert!(matches!(err, ScrubError::BadRequest(_)));
    assert_eq!(gate.outstanding_tokens(), 0);
    assert!(store.contains(&key).await);
    Ok(())
}

#[tokio::test]
async fn token_for_swept_file_redeems_as_not_found() -> Result<()> {
    let dir = tempdir()?;
    let store: Arc<DiskFileStore> = Arc::new(DiskFileStore::new(dir.path())?);
    let key = store.save(&sample_table()).await?;

    let gate = PaymentGate::new(
        store.clone(),
        Arc::new(ScriptedVerifier { file_key: Some(key.clone()) }),
    );
    let token = gate
        .notify("payment-succeeded", &json!({"reference": "ref_1"}))
        .await?;

    // The file ages out between minting and download.
    store.delete(&key).await?;

    let err = gate.redeem(&token).await.unwrap_err();
    assert!(matches!(err, ScrubError::NotFound(_)));
    Ok(())
}
