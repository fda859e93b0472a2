#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use alloy::primitives::{Address, TxHash};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

use creator_gate::access::{challenge_message, AccessPredicate, AuthSig};
use creator_gate::api::stripe_client::{
    CheckoutProvider, CheckoutSession, CreateCheckoutSession, StripeError,
};
use creator_gate::chain::{AccessGranter, ChainError, ChainHandle, GrantReceipt};
use creator_gate::chains::{ChainRegistry, ContractSet, POLYGON};
use creator_gate::ipfs::{ContentStore, Fetched, StorageError};
use creator_gate::ledger::MemoryLedger;
use creator_gate::lit::{EncryptedPayload, EncryptionError, EncryptionNetwork};
use creator_gate::moderation::Moderator;
use creator_gate::publish::Publisher;
use creator_gate::rapidapi::{
    Classifier, CompressOptions, CompressedImage, FaceDetection, ImageAnalysis, ImageModeration,
    MediaProcessor, RapidApiError, SpamCheck, TextModeration, VideoInfo,
};
use creator_gate::{AppState, Settings};

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const GRANT_TX: TxHash = TxHash::repeat_byte(0xab);

pub fn contracts() -> ContractSet {
    ContractSet {
        usdc: Address::repeat_byte(1),
        subscription_manager: Address::repeat_byte(2),
        pay_per_view_manager: Address::repeat_byte(3),
        tips_manager: Address::repeat_byte(4),
        creator_token: Address::repeat_byte(5),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantCall {
    Subscription(Address, u64),
    Access(Address, String),
}

/// Records every grant; fails while `fail` is set and takes `delay_ms`
/// before answering.
#[derive(Default)]
pub struct CountingGranter {
    pub calls: StdMutex<Vec<GrantCall>>,
    pub fail: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl CountingGranter {
    pub fn calls(&self) -> Vec<GrantCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, call: GrantCall) -> Result<GrantReceipt, ChainError> {
        self.calls.lock().unwrap().push(call);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChainError::Reverted(TxHash::repeat_byte(0xee)));
        }
        Ok(GrantReceipt {
            tx_hash: GRANT_TX,
            block_number: Some(1),
        })
    }
}

#[async_trait]
impl AccessGranter for CountingGranter {
    async fn grant_subscription(
        &self,
        subscriber: Address,
        plan_id: u64,
    ) -> Result<GrantReceipt, ChainError> {
        self.record(GrantCall::Subscription(subscriber, plan_id)).await
    }

    async fn grant_access(
        &self,
        buyer: Address,
        content_id: &str,
    ) -> Result<GrantReceipt, ChainError> {
        self.record(GrantCall::Access(buyer, content_id.to_string())).await
    }
}

#[derive(Default)]
pub struct MockCheckout {
    pub calls: AtomicUsize,
    pub last: StdMutex<Option<CreateCheckoutSession>>,
}

impl MockCheckout {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckoutProvider for MockCheckout {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSession,
    ) -> Result<CheckoutSession, StripeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(req);
        Ok(CheckoutSession {
            id: format!("cs_test_{n}"),
            url: Some(format!("https://checkout.stripe.test/cs_test_{n}")),
        })
    }
}

/// Answers with the configured results; `None` is an upstream failure.
#[derive(Default)]
pub struct ScriptedClassifier {
    pub image: Option<ImageModeration>,
    pub text: Option<TextModeration>,
    pub spam: Option<SpamCheck>,
}

impl ScriptedClassifier {
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn nsfw(score: f64) -> Self {
        Self {
            image: Some(ImageModeration {
                nsfw_score: score,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn unavailable<T>() -> Result<T, RapidApiError> {
    Err(RapidApiError::NotConfigured)
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn moderate_content(&self, _url: &str) -> Result<ImageModeration, RapidApiError> {
        self.image.clone().map_or_else(unavailable, Ok)
    }

    async fn moderate_text(&self, _text: &str) -> Result<TextModeration, RapidApiError> {
        self.text.clone().map_or_else(unavailable, Ok)
    }

    async fn detect_spam(&self, _content: &str) -> Result<SpamCheck, RapidApiError> {
        self.spam.clone().map_or_else(unavailable, Ok)
    }
}

#[derive(Default)]
pub struct StubMedia {
    pub fail: bool,
}

#[async_trait]
impl MediaProcessor for StubMedia {
    async fn analyze_image(&self, _url: &str) -> Result<ImageAnalysis, RapidApiError> {
        if self.fail {
            return unavailable();
        }
        Ok(ImageAnalysis {
            width: 640,
            height: 480,
            ..Default::default()
        })
    }

    async fn detect_faces(&self, _url: &str) -> Result<FaceDetection, RapidApiError> {
        if self.fail {
            return unavailable();
        }
        Ok(FaceDetection::default())
    }

    async fn process_video(&self, url: &str) -> Result<VideoInfo, RapidApiError> {
        if self.fail {
            return unavailable();
        }
        Ok(VideoInfo {
            duration: 12.5,
            thumbnail_url: format!("{url}.jpg"),
            ..Default::default()
        })
    }

    async fn compress_image(
        &self,
        url: &str,
        _options: &CompressOptions,
    ) -> Result<CompressedImage, RapidApiError> {
        if self.fail {
            return unavailable();
        }
        Ok(CompressedImage {
            compressed_url: format!("{url}.webp"),
            original_size: 1000,
            compressed_size: 400,
            compression_ratio: 0.4,
        })
    }
}

/// In-memory content store handing out sequential CIDs.
#[derive(Default)]
pub struct MemStore {
    pub objects: StdMutex<HashMap<String, (Vec<u8>, String)>>,
}

#[async_trait]
impl ContentStore for MemStore {
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        let mut objects = self.objects.lock().unwrap();
        let cid = format!("bafytest{}", objects.len());
        objects.insert(cid.clone(), (bytes, content_type.to_string()));
        Ok(cid)
    }

    async fn get(&self, cid: &str) -> Result<Fetched, StorageError> {
        let (bytes, content_type) = self
            .objects
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .ok_or(StorageError::Fetch {
                cid: cid.to_string(),
                status: 404,
            })?;
        if content_type == "application/json" {
            Ok(Fetched::Json(serde_json::from_slice(&bytes).unwrap()))
        } else {
            Ok(Fetched::Blob {
                content_type,
                bytes,
            })
        }
    }

    fn gateway_url(&self, cid: &str) -> String {
        format!("https://{cid}.ipfs.test")
    }
}

/// Hex "encryption"; decryption checks the auth sig and then asks
/// `allowed` whether the signer may read.
#[derive(Default)]
pub struct MirrorNetwork {
    pub allowed: StdMutex<Vec<Address>>,
}

#[async_trait]
impl EncryptionNetwork for MirrorNetwork {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        _predicate: &AccessPredicate,
    ) -> Result<EncryptedPayload, EncryptionError> {
        Ok(EncryptedPayload {
            ciphertext: hex::encode(plaintext),
            data_to_encrypt_hash: "hash".to_string(),
        })
    }

    async fn decrypt(
        &self,
        payload: &EncryptedPayload,
        _predicate: &AccessPredicate,
        auth_sig: &AuthSig,
    ) -> Result<Vec<u8>, EncryptionError> {
        let now = chrono::Utc::now().timestamp_millis();
        let signer = auth_sig.verify(now, 300_000)?;
        if !self.allowed.lock().unwrap().contains(&signer) {
            return Err(EncryptionError::Denied {
                status: 403,
                body: "access conditions not met".to_string(),
            });
        }
        Ok(hex::decode(&payload.ciphertext).unwrap())
    }
}

/// Every collaborator of [`AppState`] as a test double.
pub struct Harness {
    pub granter: Arc<CountingGranter>,
    pub ledger: Arc<MemoryLedger>,
    pub checkout: Arc<MockCheckout>,
    pub classifier: Arc<ScriptedClassifier>,
    pub media: Arc<StubMedia>,
    pub store: Arc<MemStore>,
    pub network: Arc<MirrorNetwork>,
    pub min_amount_cents: u64,
    pub grant_deadline_secs: u64,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            granter: Arc::default(),
            ledger: Arc::new(MemoryLedger::new()),
            checkout: Arc::default(),
            classifier: Arc::default(),
            media: Arc::default(),
            store: Arc::default(),
            network: Arc::default(),
            min_amount_cents: 1,
            grant_deadline_secs: 30,
        }
    }
}

impl Harness {
    pub fn state(&self) -> AppState {
        let registry = ChainRegistry::new(POLYGON, BTreeMap::from([(POLYGON, contracts())]))
            .expect("registry");
        // Never dialled by these tests.
        let chain = ChainHandle::new("http://127.0.0.1:1", POLYGON, contracts(), None)
            .expect("chain handle");

        AppState {
            settings: Settings {
                app_url: "https://app.test".to_string(),
                stripe_webhook_secret: WEBHOOK_SECRET.to_string(),
                checkout_min_amount_cents: self.min_amount_cents,
                auth_sig_max_age_secs: 300,
                grant_deadline_secs: self.grant_deadline_secs,
            },
            registry: Arc::new(registry),
            chain: Arc::new(chain),
            granter: self.granter.clone(),
            ledger: self.ledger.clone(),
            checkout: self.checkout.clone(),
            moderator: Arc::new(Moderator::new(self.classifier.clone()).with_threshold(0.7)),
            media: self.media.clone(),
            publisher: Arc::new(Publisher::new(
                self.store.clone(),
                self.network.clone(),
                POLYGON,
                contracts(),
            )),
        }
    }
}

/// A fresh signature over the challenge for `signer`.
pub fn wallet_auth(signer: &PrivateKeySigner) -> AuthSig {
    let ts = chrono::Utc::now().timestamp_millis();
    let sig = signer
        .sign_message_sync(challenge_message(ts).as_bytes())
        .expect("sign challenge");
    AuthSig::new(&sig, ts, signer.address())
}

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

/// Recreates the database named by `TEST_DATABASE_URL` and runs the
/// migrations. `None` when the variable is not set.
pub async fn init_test_db() -> Option<TestDb> {
    dotenvy::dotenv().ok();
    let test_url = env::var("TEST_DATABASE_URL").ok()?;
    let (admin_url, db_name) =
        split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url)
        .await
        .expect("connect admin db");

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    sqlx::query(&create_sql)
        .execute(&admin_pool)
        .await
        .expect("create test db");
    admin_pool.close().await;

    let pool = PgPool::connect(&test_url)
        .await
        .expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    Some(TestDb { pool, _guard: guard })
}
