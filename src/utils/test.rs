use std::sync::{
    atomic::{AtomicBool, AtomicI32, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::types::InlineKeyboardMarkup;

use crate::{
    config::AppConfig,
    error::BotResult,
    platform::{
        traits::{Assistant, EmbassyApi},
        PlatformError, PlatformRegistry,
    },
    service::user::{Role, User},
    state::AppState,
    storage::StorageManager,
    transport::{CallbackOrigin, ChatTransport, IncomingCallback, IncomingMessage, SendOptions, Sender},
};

/// One outbound transport call, as observed by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat_id: i64,
        message_id: i32,
        text: String,
        silent: bool,
        has_markup: bool,
    },
    Photo {
        chat_id: i64,
        message_id: i32,
        caption: Option<String>,
    },
    Edit {
        chat_id: i64,
        message_id: i32,
        text: String,
    },
    Delete {
        chat_id: i64,
        message_id: i32,
    },
    Forward {
        to: i64,
        from: i64,
        message_id: i32,
    },
    Pin {
        chat_id: i64,
        message_id: i32,
    },
    Answer {
        callback_id: String,
    },
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    last_id: AtomicI32,
}

impl RecordingTransport {
    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }

    fn next_id(&self) -> i32 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Bodies of newly sent text messages, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat_id: i64, text: &str, options: SendOptions) -> BotResult<i32> {
        let message_id = self.next_id();
        self.record(Sent::Text {
            chat_id,
            message_id,
            text: text.to_string(),
            silent: options.silent,
            has_markup: options.markup.is_some(),
        });
        Ok(message_id)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        _photo: Vec<u8>,
        caption: Option<&str>,
        _options: SendOptions,
    ) -> BotResult<i32> {
        let message_id = self.next_id();
        self.record(Sent::Photo {
            chat_id,
            message_id,
            caption: caption.map(str::to_string),
        });
        Ok(message_id)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        _markup: Option<InlineKeyboardMarkup>,
    ) -> BotResult<()> {
        self.record(Sent::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> BotResult<()> {
        self.record(Sent::Delete { chat_id, message_id });
        Ok(())
    }

    async fn forward_message(&self, to_chat_id: i64, from_chat_id: i64, message_id: i32) -> BotResult<()> {
        self.record(Sent::Forward {
            to: to_chat_id,
            from: from_chat_id,
            message_id,
        });
        Ok(())
    }

    async fn pin_message(&self, chat_id: i64, message_id: i32) -> BotResult<()> {
        self.record(Sent::Pin { chat_id, message_id });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> BotResult<()> {
        self.record(Sent::Answer {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeEmbassy {
    pinged: Mutex<Vec<String>>,
    devices: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl FakeEmbassy {
    pub fn pinged(&self) -> Vec<String> {
        self.pinged.lock().unwrap().clone()
    }

    pub fn set_devices(&self, devices: &[&str]) {
        *self.devices.lock().unwrap() = devices.iter().map(|device| device.to_string()).collect();
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), PlatformError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable("embassy is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EmbassyApi for FakeEmbassy {
    async fn unlock_door(&self) -> Result<(), PlatformError> {
        self.check_online()
    }

    async fn devices_inside(&self) -> Result<Vec<String>, PlatformError> {
        self.check_online()?;
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn webcam(&self, _name: &str) -> Result<Vec<u8>, PlatformError> {
        self.check_online()?;
        Ok(vec![0xFF, 0xD8, 0xFF])
    }

    async fn ping(&self, host: &str) -> Result<String, PlatformError> {
        self.check_online()?;
        self.pinged.lock().unwrap().push(host.to_string());
        Ok(format!("64 bytes from {}: time=1 ms", host))
    }
}

pub struct FakeAssistant {
    answer: String,
}

impl FakeAssistant {
    pub fn answering(answer: &str) -> Arc<dyn Assistant> {
        Arc::new(Self {
            answer: answer.to_string(),
        })
    }
}

#[async_trait]
impl Assistant for FakeAssistant {
    async fn ask(&self, _prompt: &str) -> Result<String, PlatformError> {
        Ok(self.answer.clone())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub transport: Arc<RecordingTransport>,
    pub embassy: Arc<FakeEmbassy>,
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(AppConfig::new_test_config(), None).await
}

/// Builds an app on in-memory storage with a recording transport and fake platform clients.
pub async fn setup_test_app_with(config: AppConfig, assistant: Option<Arc<dyn Assistant>>) -> TestApp {
    let transport = Arc::new(RecordingTransport::default());
    let embassy = Arc::new(FakeEmbassy::default());
    let platform = Arc::new(PlatformRegistry::with_clients(embassy.clone(), assistant));

    let state = AppState::with_storage(config, StorageManager::memory(), platform, transport.clone())
        .await
        .expect("Failed to initialize test app state");

    TestApp {
        state,
        transport,
        embassy,
    }
}

pub async fn add_user(app: &TestApp, id: u64, username: &str, roles: &[Role]) -> User {
    let user = User::new(id, Some(username.to_string()), Some(username.to_string())).with_roles(roles);
    app.state.storage.users.add_user(&user).await.unwrap();
    user
}

fn sender(id: u64) -> Sender {
    Sender {
        id,
        username: None,
        first_name: format!("user{}", id),
    }
}

pub fn message(chat_id: i64, sender_id: u64, text: &str) -> IncomingMessage {
    message_at(chat_id, sender_id, text, Utc::now())
}

pub fn message_at(chat_id: i64, sender_id: u64, text: &str, date: DateTime<Utc>) -> IncomingMessage {
    IncomingMessage {
        chat_id,
        message_id: 1000,
        is_private: chat_id > 0,
        from: Some(sender(sender_id)),
        text: Some(text.to_string()),
        caption: None,
        date,
    }
}

pub fn callback(chat_id: i64, sender_id: u64, data: &str) -> IncomingCallback {
    IncomingCallback {
        id: format!("cb-{}", sender_id),
        from: Some(sender(sender_id)),
        data: Some(data.to_string()),
        origin: Some(CallbackOrigin {
            chat_id,
            message_id: 2000,
            is_private: chat_id > 0,
        }),
    }
}
