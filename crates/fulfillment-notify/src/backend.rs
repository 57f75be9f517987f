//! Pluggable delivery backends (§4.10: "Backends: pluggable `EmailBackend`,
//! `SMSBackend`, `PushBackend`. Each has an in-memory test double that
//! appends to a list.").
//!
//! Each backend is an `async_trait` object with an in-memory test double
//! that appends to a list instead of calling out to a real provider.

use std::sync::Mutex;

use async_trait::async_trait;

/// Minimal email delivery surface. A production implementation would wrap
/// an SMTP client configured from `fulfillment-config`'s `SmtpConfig`.
#[async_trait]
pub trait EmailBackend: Send + Sync {
	async fn send_email(&self, recipient: &str, subject: &str, text_body: &str, html_body: Option<&str>);
}

#[async_trait]
pub trait SmsBackend: Send + Sync {
	async fn send_sms(&self, recipient: &str, text_body: &str);
}

#[async_trait]
pub trait PushBackend: Send + Sync {
	async fn send_push(&self, recipient: &str, title: &str, body: &str);
}

#[derive(Debug, Clone)]
pub struct SentEmail {
	pub recipient: String,
	pub subject: String,
	pub text_body: String,
	pub html_body: Option<String>,
}

/// Test double: appends every send to an in-memory list instead of
/// performing I/O (§4.10).
#[derive(Default)]
pub struct InMemoryEmailBackend {
	sent: Mutex<Vec<SentEmail>>,
}

impl InMemoryEmailBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn sent(&self) -> Vec<SentEmail> {
		self.sent.lock().unwrap().clone()
	}
}

#[async_trait]
impl EmailBackend for InMemoryEmailBackend {
	async fn send_email(&self, recipient: &str, subject: &str, text_body: &str, html_body: Option<&str>) {
		self.sent.lock().unwrap().push(SentEmail {
			recipient: recipient.to_string(),
			subject: subject.to_string(),
			text_body: text_body.to_string(),
			html_body: html_body.map(str::to_string),
		});
	}
}

#[derive(Debug, Clone)]
pub struct SentSms {
	pub recipient: String,
	pub text_body: String,
}

#[derive(Default)]
pub struct InMemorySmsBackend {
	sent: Mutex<Vec<SentSms>>,
}

impl InMemorySmsBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn sent(&self) -> Vec<SentSms> {
		self.sent.lock().unwrap().clone()
	}
}

#[async_trait]
impl SmsBackend for InMemorySmsBackend {
	async fn send_sms(&self, recipient: &str, text_body: &str) {
		self.sent.lock().unwrap().push(SentSms { recipient: recipient.to_string(), text_body: text_body.to_string() });
	}
}

#[derive(Debug, Clone)]
pub struct SentPush {
	pub recipient: String,
	pub title: String,
	pub body: String,
}

#[derive(Default)]
pub struct InMemoryPushBackend {
	sent: Mutex<Vec<SentPush>>,
}

impl InMemoryPushBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn sent(&self) -> Vec<SentPush> {
		self.sent.lock().unwrap().clone()
	}
}

#[async_trait]
impl PushBackend for InMemoryPushBackend {
	async fn send_push(&self, recipient: &str, title: &str, body: &str) {
		self.sent.lock().unwrap().push(SentPush {
			recipient: recipient.to_string(),
			title: title.to_string(),
			body: body.to_string(),
		});
	}
}
