//! Chat-command service: registration, access gate, `/group_parsing` digests,
//! token capture, manual posts and operator commands.

pub mod input;
pub mod sessions;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    crosspost::CrossPoster,
    digest::digest_document,
    domain::{AccessToken, ChatId, SourceGroup, UserId},
    formatting::{code, describe_user, escape_html, link},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, IncomingText},
    },
    ports::{Publisher, SourceFetcher},
    profiles::{Access, Profile, ProfileStore, StatusChange},
    utils::unix_millis,
};

use input::Command;
use sessions::{ConversationStore, Step};

const WELCOME: &str = "Hi! This is a wall relay bot. See the menu for available commands. \
The bot is in test mode: you can use it once an administrator approves your profile.";
const ALREADY_REGISTERED: &str = "You are already registered.";
const START_FIRST: &str = "Please send /start first.";
const BANNED: &str = "Your profile is blocked; you cannot use this bot.";
const INACTIVE: &str = "Your profile has not been approved yet.";
const APPROVED: &str = "Your profile has been approved. See the menu for available commands.";
const ASK_GROUP: &str = "Send the VK group id, for example \"public123456\" or \"club78910\".";
const NO_POSTS: &str = "No posts found.";
const DIGEST_FAILED: &str = "Sorry, something went wrong while fetching posts.";
const TOKEN_SAVED: &str = "Your token has been updated.";
const POST_USAGE: &str = "Usage: /post <text> (or: сделать пост | <text>)";
const POST_FAILED: &str = "Failed to publish the post.";
const CANCELLED: &str = "Cancelled.";
const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";
const ADMIN_ONLY: &str = "This command is only available to the administrator.";
const TICK_BUSY: &str = "A cross-post tick is already running.";
const UNKNOWN_COMMAND: &str = "Unknown command.";
const HINT: &str = "Use the menu commands: /group_parsing, /post, /cancel.";
const GENERIC_FAILURE: &str = "Sorry, something went wrong. Please try again later.";

#[derive(Clone, Debug)]
pub struct ChatSettings {
    pub admin_chat_id: Option<ChatId>,
    pub oauth_client_id: String,
    pub digest_max_posts: u32,
    pub digest_text_limit: usize,
}

impl ChatSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            admin_chat_id: cfg.admin_chat_id,
            oauth_client_id: cfg.vk_oauth_client_id.clone(),
            digest_max_posts: cfg.digest_max_posts,
            digest_text_limit: cfg.digest_text_limit,
        }
    }
}

/// Everything the service talks to.
pub struct ChatPorts {
    pub messenger: Arc<dyn MessagingPort>,
    pub profiles: Arc<dyn ProfileStore>,
    pub fetcher: Arc<dyn SourceFetcher>,
    /// Bound to the destination group; called with the requesting user's token.
    pub publisher: Arc<dyn Publisher>,
    pub crossposter: Arc<CrossPoster>,
}

pub struct ChatService {
    settings: ChatSettings,
    ports: ChatPorts,
    sessions: Arc<ConversationStore>,
    shutdown: CancellationToken,
}

impl ChatService {
    pub fn new(
        settings: ChatSettings,
        ports: ChatPorts,
        sessions: Arc<ConversationStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            ports,
            sessions,
            shutdown,
        }
    }

    /// The operator's private chat, with the operator as sender.
    fn is_admin(&self, msg: &IncomingText) -> bool {
        self.settings
            .admin_chat_id
            .is_some_and(|admin| msg.chat_id == admin && msg.user_id.0 == admin.0)
    }

    pub async fn handle_text(&self, msg: &IncomingText) {
        // Message text may carry a pasted token; only its length is logged.
        info!(
            chat_id = msg.chat_id.0,
            user_id = msg.user_id.0,
            username = msg.username.as_deref().unwrap_or(""),
            text_len = msg.text.chars().count(),
            "incoming message"
        );

        let command = input::parse_command(&msg.text);

        if self.is_admin(msg) {
            if let Some(cmd) = &command {
                if self.handle_admin_command(msg.chat_id, cmd).await {
                    return;
                }
            }
        }

        let profile = match self.ports.profiles.get(msg.user_id).await {
            Ok(p) => p,
            Err(e) => {
                error!(user_id = msg.user_id.0, error = %e, "profile lookup failed");
                self.reply(msg.chat_id, GENERIC_FAILURE).await;
                return;
            }
        };

        let Some(profile) = profile else {
            if command == Some(Command::Start) {
                self.register(msg).await;
            } else {
                self.reply(msg.chat_id, START_FIRST).await;
            }
            return;
        };

        match profile.access() {
            Access::Banned => {
                self.reply(msg.chat_id, BANNED).await;
                return;
            }
            Access::Inactive => {
                self.reply(msg.chat_id, INACTIVE).await;
                return;
            }
            Access::Allowed => {}
        }

        if let Some(cmd) = command {
            self.handle_command(msg.chat_id, &profile, cmd).await;
            return;
        }

        if let Some(token) = input::extract_access_token(&msg.text) {
            self.save_token(msg, &token).await;
            return;
        }

        if input::is_legacy_post(&msg.text) {
            match input::legacy_post_body(&msg.text) {
                Some(body) => self.manual_post(msg.chat_id, &profile, body).await,
                None => self.reply(msg.chat_id, POST_USAGE).await,
            }
            return;
        }

        match self.sessions.step(msg.chat_id).await {
            Step::AwaitingGroup => self.accept_group(msg).await,
            Step::AwaitingCount { group } => self.accept_count(msg, &profile, group).await,
            Step::Idle => self.reply(msg.chat_id, HINT).await,
        }
    }

    async fn handle_command(&self, chat_id: ChatId, profile: &Profile, cmd: Command) {
        match cmd {
            Command::Start => self.reply(chat_id, ALREADY_REGISTERED).await,
            Command::GroupParsing => {
                if profile.token().is_none() {
                    self.send_oauth_link(chat_id).await;
                    return;
                }
                self.sessions.set_step(chat_id, Step::AwaitingGroup).await;
                self.reply(chat_id, ASK_GROUP).await;
            }
            Command::Post(text) if text.trim().is_empty() => self.reply(chat_id, POST_USAGE).await,
            Command::Post(text) => self.manual_post(chat_id, profile, text.trim()).await,
            Command::Cancel => {
                let reply = if self.sessions.reset(chat_id).await {
                    CANCELLED
                } else {
                    NOTHING_TO_CANCEL
                };
                self.reply(chat_id, reply).await;
            }
            Command::CrossPost | Command::Approve(_) | Command::Ban(_) | Command::Unban(_) => {
                self.reply(chat_id, ADMIN_ONLY).await
            }
            Command::Unknown(name) => {
                debug!(chat_id = chat_id.0, command = %name, "unknown command");
                self.reply(chat_id, UNKNOWN_COMMAND).await;
            }
        }
    }

    /// Returns `false` if `cmd` is not an operator command.
    async fn handle_admin_command(&self, chat_id: ChatId, cmd: &Command) -> bool {
        match cmd {
            Command::CrossPost => self.crosspost_now(chat_id).await,
            Command::Approve(arg) => self.moderate(chat_id, arg, StatusChange::Approve).await,
            Command::Ban(arg) => self.moderate(chat_id, arg, StatusChange::Ban).await,
            Command::Unban(arg) => self.moderate(chat_id, arg, StatusChange::Unban).await,
            _ => return false,
        }
        true
    }

    async fn register(&self, msg: &IncomingText) {
        let profile = Profile::new_inactive(msg.user_id, &msg.first_name, msg.username.as_deref());
        match self.ports.profiles.insert_if_absent(profile).await {
            Ok(true) => {
                info!(user_id = msg.user_id.0, "registered new user");
                self.reply(msg.chat_id, WELCOME).await;
                self.notify_admin_of_registration(msg).await;
            }
            Ok(false) => self.reply(msg.chat_id, ALREADY_REGISTERED).await,
            Err(e) => {
                error!(user_id = msg.user_id.0, error = %e, "failed to register user");
                self.reply(msg.chat_id, GENERIC_FAILURE).await;
            }
        }
    }

    async fn notify_admin_of_registration(&self, msg: &IncomingText) {
        let Some(admin) = self.settings.admin_chat_id else {
            return;
        };
        let html = format!(
            "<b>New user needs approval</b>\n{}\nApprove with {}",
            describe_user(msg.user_id, &msg.first_name, msg.username.as_deref()),
            code(&format!("/approve {}", msg.user_id.0))
        );
        self.reply_html(admin, &html).await;
    }

    async fn moderate(&self, chat_id: ChatId, arg: &str, change: StatusChange) {
        let Ok(id) = arg.trim().parse::<i64>() else {
            let usage = match change {
                StatusChange::Approve => "Usage: /approve <user_id>",
                StatusChange::Ban => "Usage: /ban <user_id>",
                StatusChange::Unban => "Usage: /unban <user_id>",
            };
            self.reply(chat_id, usage).await;
            return;
        };
        let user_id = UserId(id);

        match self.ports.profiles.update_status(user_id, change).await {
            Ok(true) => {
                info!(user_id = id, ?change, "profile status changed");
                let verb = match change {
                    StatusChange::Approve => "approved",
                    StatusChange::Ban => "banned",
                    StatusChange::Unban => "unbanned",
                };
                self.reply(chat_id, &format!("User {id} {verb}.")).await;
                if change == StatusChange::Approve {
                    // Private chats share the user's id.
                    self.reply(ChatId(id), APPROVED).await;
                }
            }
            Ok(false) => self.reply(chat_id, &format!("User {id} not found.")).await,
            Err(e) => {
                error!(user_id = id, error = %e, "failed to update profile status");
                self.reply(chat_id, GENERIC_FAILURE).await;
            }
        }
    }

    async fn crosspost_now(&self, chat_id: ChatId) {
        info!(chat_id = chat_id.0, "manual cross-post tick requested");
        match self.ports.crossposter.run_tick(&self.shutdown).await {
            Some(report) => {
                self.reply(
                    chat_id,
                    &format!("Cross-post tick finished: {}", report.summary()),
                )
                .await
            }
            None => self.reply(chat_id, TICK_BUSY).await,
        }
    }

    async fn send_oauth_link(&self, chat_id: ChatId) {
        let url = input::oauth_link(&self.settings.oauth_client_id);
        let html = format!(
            "Open this {}, grant access and send me the resulting URL from the address bar.",
            link(&url, "link")
        );
        self.reply_html(chat_id, &html).await;
    }

    async fn save_token(&self, msg: &IncomingText, token: &AccessToken) {
        match self.ports.profiles.set_token(msg.user_id, token).await {
            Ok(()) => {
                info!(user_id = msg.user_id.0, "access token updated");
                self.reply(msg.chat_id, TOKEN_SAVED).await;
            }
            Err(e) => {
                error!(user_id = msg.user_id.0, error = %e, "failed to store access token");
                self.reply(msg.chat_id, GENERIC_FAILURE).await;
            }
        }
    }

    async fn manual_post(&self, chat_id: ChatId, profile: &Profile, text: &str) {
        let Some(token) = profile.token() else {
            self.send_oauth_link(chat_id).await;
            return;
        };
        match self.ports.publisher.publish(text, &token).await {
            Ok(posted) => {
                info!(
                    user_id = profile.id,
                    remote_post_id = posted.post_id,
                    "manual post published"
                );
                self.reply(chat_id, &format!("Post published (id {}).", posted.post_id))
                    .await;
            }
            Err(e) => {
                warn!(user_id = profile.id, error = %e, "manual post failed");
                self.reply(chat_id, POST_FAILED).await;
            }
        }
    }

    async fn accept_group(&self, msg: &IncomingText) {
        let group = SourceGroup::new(msg.text.as_str());
        if group.as_str().is_empty() || group.as_str().contains(char::is_whitespace) {
            self.reply(msg.chat_id, ASK_GROUP).await;
            return;
        }
        self.sessions
            .set_step(msg.chat_id, Step::AwaitingCount { group })
            .await;
        let ask = format!(
            "How many posts should I fetch? Send a number from 1 to {}.",
            self.settings.digest_max_posts
        );
        self.reply(msg.chat_id, &ask).await;
    }

    async fn accept_count(&self, msg: &IncomingText, profile: &Profile, group: SourceGroup) {
        let max = self.settings.digest_max_posts;
        let Some(count) = input::parse_post_count(&msg.text, max) else {
            self.reply(
                msg.chat_id,
                &format!("Please send a whole number from 1 to {max}."),
            )
            .await;
            return;
        };
        self.sessions.set_step(msg.chat_id, Step::Idle).await;

        let Some(token) = profile.token() else {
            self.send_oauth_link(msg.chat_id).await;
            return;
        };

        self.reply_html(
            msg.chat_id,
            &format!(
                "Fetching {count} posts from group {}...",
                escape_html(group.as_str())
            ),
        )
        .await;
        self.send_digest(msg.chat_id, &token, &group, count).await;
    }

    async fn send_digest(
        &self,
        chat_id: ChatId,
        token: &AccessToken,
        group: &SourceGroup,
        count: u32,
    ) {
        let _ = self
            .ports
            .messenger
            .send_chat_action(chat_id, ChatAction::UploadDocument)
            .await;

        let posts = match self.ports.fetcher.fetch_recent(token, group, count).await {
            Ok(posts) => posts,
            Err(e) => {
                error!(chat_id = chat_id.0, %group, error = %e, "digest fetch failed");
                self.reply(chat_id, DIGEST_FAILED).await;
                return;
            }
        };
        if posts.is_empty() {
            self.reply(chat_id, NO_POSTS).await;
            return;
        }

        let doc = digest_document(group, &posts, self.settings.digest_text_limit, unix_millis());
        let file_name = doc.file_name.clone();
        match self.ports.messenger.send_document(chat_id, doc).await {
            Ok(_) => info!(
                chat_id = chat_id.0,
                %group,
                posts = posts.len(),
                %file_name,
                "digest sent"
            ),
            Err(e) => {
                error!(chat_id = chat_id.0, %group, error = %e, "failed to send digest");
                self.reply(chat_id, DIGEST_FAILED).await;
            }
        }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.ports.messenger.send_text(chat_id, text).await {
            warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
        }
    }

    async fn reply_html(&self, chat_id: ChatId, html: &str) {
        if let Err(e) = self.ports.messenger.send_html(chat_id, html).await {
            warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
        }
    }
}
