use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::warn;

use refai_core::{
    Attachment, AuthSession, BackendClient, ChatSession, Config, Gate, Notification, RelayClient,
    SubscriptionState,
};

/// How long a notification stays on screen
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    Checking,
    Paywall,
    Chat,
    Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthField {
    Email,
    Password,
    Username,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text field with a character cursor
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    pub value: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.value.chars().count() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.value.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.value)
    }

    pub fn clear(&mut self) {
        self.take();
    }
}

/// Slash commands typed into the chat input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Attach(PathBuf),
    Detach,
}

impl Command {
    /// `None` means the input is a message, not a command.
    pub fn parse(input: &str) -> Option<Result<Self, String>> {
        let input = input.trim();
        let (name, arg) = match input.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (input, ""),
        };
        match name {
            "/attach" if arg.is_empty() => Some(Err("Usage: /attach <path>".to_string())),
            "/attach" => Some(Ok(Command::Attach(expand_home(arg)))),
            "/detach" => Some(Ok(Command::Detach)),
            _ => None,
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub notification: Notification,
    pub expires_at: Instant,
}

pub struct App {
    pub should_quit: bool,

    // Chat state
    pub chat: ChatSession,
    pub input: TextInput,
    pub attachments: Vec<Attachment>,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub follow_output: bool,

    // Overlays
    pub show_sources: bool,
    pub sources_scroll: u16,
    pub show_subscription: bool,

    // Auth form
    pub auth_mode: AuthMode,
    pub auth_field: AuthField,
    pub email: TextInput,
    pub password: TextInput,
    pub username: TextInput,
    pub auth_pending: bool,

    // Session and billing
    pub session: Option<AuthSession>,
    pub subscription: SubscriptionState,
    pub url_pending: bool,

    pub toasts: Vec<Toast>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Clients
    pub relay: RelayClient,
    /// `None` when no backend is configured; gating is then skipped
    pub backend: Option<BackendClient>,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let client_key = config.client_key().unwrap_or_else(|| {
            warn!("No client key configured, relay requests will be unauthenticated");
            String::new()
        });
        let relay = RelayClient::new(&config.relay_url(), &client_key);
        let backend = config
            .backend_url()
            .map(|url| BackendClient::new(&url, &client_key));
        if backend.is_none() {
            warn!("No backend configured, sign-in and subscription checks are disabled");
        }

        Self {
            should_quit: false,
            chat: ChatSession::new(),
            input: TextInput::default(),
            attachments: Vec::new(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_output: true,
            show_sources: false,
            sources_scroll: 0,
            show_subscription: false,
            auth_mode: AuthMode::SignIn,
            auth_field: AuthField::Email,
            email: TextInput::default(),
            password: TextInput::default(),
            username: TextInput::default(),
            auth_pending: false,
            session: config.session.clone(),
            subscription: SubscriptionState::default(),
            url_pending: false,
            toasts: Vec::new(),
            animation_frame: 0,
            relay,
            backend,
        }
    }

    pub fn gate(&self) -> Gate {
        if self.backend.is_none() {
            return Gate::Chat;
        }
        Gate::resolve(self.session.as_ref(), &self.subscription)
    }

    pub fn screen(&self) -> Screen {
        match self.gate() {
            Gate::SignIn => Screen::SignIn,
            Gate::Checking => Screen::Checking,
            Gate::Paywall => Screen::Paywall,
            Gate::Chat if self.show_subscription && self.session.is_some() => Screen::Subscription,
            Gate::Chat => Screen::Chat,
        }
    }

    /// Whether a subscription check should be started now
    pub fn subscription_check_due(&self, now: Instant) -> bool {
        self.backend.is_some() && self.session.is_some() && self.subscription.is_due(now)
    }

    pub fn set_session(&mut self, session: Option<AuthSession>) {
        self.session = session;
        self.subscription.clear();
        self.show_subscription = false;
        self.password.clear();
        if let Err(e) = Config::save_session(self.session.as_ref()) {
            warn!("Failed to persist session: {}", e);
        }
    }

    pub fn notify(&mut self, notification: Notification) {
        self.toasts.push(Toast {
            notification,
            expires_at: Instant::now() + NOTIFICATION_TTL,
        });
    }

    /// Move notifications raised by the chat session onto the screen.
    pub fn drain_chat_notifications(&mut self) {
        for notification in self.chat.take_notifications() {
            self.notify(notification);
        }
    }

    pub fn on_tick(&mut self, now: Instant) {
        if self.chat.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.toasts.retain(|t| t.expires_at > now);
    }

    pub fn toggle_auth_mode(&mut self) {
        self.auth_mode = match self.auth_mode {
            AuthMode::SignIn => AuthMode::SignUp,
            AuthMode::SignUp => AuthMode::SignIn,
        };
        if self.auth_mode == AuthMode::SignIn && self.auth_field == AuthField::Username {
            self.auth_field = AuthField::Email;
        }
    }

    pub fn next_auth_field(&mut self) {
        self.auth_field = match (self.auth_field, self.auth_mode) {
            (AuthField::Email, _) => AuthField::Password,
            (AuthField::Password, AuthMode::SignUp) => AuthField::Username,
            (AuthField::Password, AuthMode::SignIn) | (AuthField::Username, _) => AuthField::Email,
        };
    }

    pub fn prev_auth_field(&mut self) {
        self.auth_field = match (self.auth_field, self.auth_mode) {
            (AuthField::Email, AuthMode::SignUp) => AuthField::Username,
            (AuthField::Email, AuthMode::SignIn) | (AuthField::Username, _) => AuthField::Password,
            (AuthField::Password, _) => AuthField::Email,
        };
    }

    pub fn focused_auth_input(&mut self) -> &mut TextInput {
        match self.auth_field {
            AuthField::Email => &mut self.email,
            AuthField::Password => &mut self.password,
            AuthField::Username => &mut self.username,
        }
    }

    /// Run a slash command. Returns false when the input was not a command.
    pub fn run_command(&mut self, input: &str) -> bool {
        let command = match Command::parse(input) {
            Some(Ok(command)) => command,
            Some(Err(usage)) => {
                self.notify(Notification::warning("Attach", &usage));
                return true;
            }
            None => return false,
        };

        match command {
            Command::Attach(path) => match Attachment::from_path(&path) {
                Ok(attachment) => {
                    if !attachment.within_limit() {
                        // Still kept so submit reports and drops it
                        warn!("{} is over the attachment size limit", attachment.name);
                    }
                    self.attachments.push(attachment);
                }
                Err(e) => {
                    warn!("Attach failed: {}", e);
                    self.notify(Notification::error("Attach failed", &e.to_string()));
                }
            },
            Command::Detach => self.attachments.clear(),
        }
        true
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_output = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_chat_scroll());
        self.follow_output = self.chat_scroll >= self.max_chat_scroll();
    }

    /// Keep the newest message (or the loading indicator) in view.
    pub fn scroll_chat_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
        self.follow_output = true;
    }

    fn max_chat_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_line_count().saturating_sub(visible_height)
    }

    fn chat_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total_lines: usize = 0;
        for msg in self.chat.messages() {
            total_lines += 1; // Role line ("You:" or "RefAI:")
            if !msg.attachments.is_empty() {
                total_lines += 1;
            }
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                total_lines += line.chars().count() / wrap_width + 1;
            }
            total_lines += 1; // Blank line after message
        }

        if self.chat.is_loading() {
            total_lines += 2;
        }

        total_lines.min(u16::MAX as usize) as u16
    }
}
