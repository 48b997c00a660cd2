use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use countdown_core::{
    Action, Button, Clock, Dispatcher, MessageFormat, Notifier, Reply, ReplyKind, Scheduler,
    SharedStore, SystemClock, TriggerTime,
};
use serenity::all::{
    ButtonStyle, ChannelId, CommandInteraction, ComponentInteraction, CreateActionRow,
    CreateButton, CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateMessage, GatewayIntents, Http, Interaction,
};
use serenity::async_trait;
use serenity::client::Context as SerenityContext;
use serenity::model::application::CommandOptionType;
use serenity::prelude::*;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// Discord チャンネルへ通知を送る。チャット ID はチャンネル ID。
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl Notifier for DiscordNotifier {
    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        let channel_id = chat_id
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .with_context(|| format!("Invalid channel id: {chat_id}"))?;

        ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().content(text))
            .await
            .context("Failed to send message")?;

        Ok(())
    }
}

pub struct Handler {
    dispatcher: Dispatcher,
    store: SharedStore,
    clock: Arc<dyn Clock>,
    format: Arc<MessageFormat>,
    trigger: TriggerTime,
    interval: Duration,
    /// 再接続で ready が複数回呼ばれてもスケジューラは 1 つだけ起動する
    scheduler_started: AtomicBool,
}

impl Handler {
    pub fn new(config: &Config, store: SharedStore) -> Result<Self> {
        let trigger = config.schedule.trigger()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let format = Arc::new(config.message.clone());

        let dispatcher = Dispatcher::new(store.clone(), clock.clone(), format.clone())
            .with_trigger(trigger)
            .with_default_offset(config.schedule.default_tz_offset);

        Ok(Self {
            dispatcher,
            store,
            clock,
            format,
            trigger,
            interval: config.schedule.interval,
            scheduler_started: AtomicBool::new(false),
        })
    }

    async fn handle_command(
        &self,
        ctx: &SerenityContext,
        command: &CommandInteraction,
    ) -> Result<()> {
        let argument = command
            .data
            .options
            .first()
            .and_then(|opt| opt.value.as_str());

        let Some(action) = parse_command(&command.data.name, argument) else {
            warn!(command = %command.data.name, "Unknown command");
            return Ok(());
        };

        let chat_id = command.channel_id.get().to_string();
        let reply = self.dispatcher.handle(&chat_id, action).await?;

        command
            .create_response(&ctx.http, build_response(&reply))
            .await?;

        Ok(())
    }

    async fn handle_component(
        &self,
        ctx: &SerenityContext,
        component: &ComponentInteraction,
    ) -> Result<()> {
        let Some(button) = Button::from_custom_id(&component.data.custom_id) else {
            warn!(custom_id = %component.data.custom_id, "Unknown button");
            return Ok(());
        };

        let chat_id = component.channel_id.get().to_string();
        let reply = self
            .dispatcher
            .handle(&chat_id, Action::Button(button))
            .await?;

        component
            .create_response(&ctx.http, build_response(&reply))
            .await?;

        Ok(())
    }

    fn start_scheduler(&self, http: Arc<Http>) {
        if self.scheduler_started.swap(true, Ordering::SeqCst) {
            debug!("Scheduler already running");
            return;
        }

        let scheduler = Scheduler::new(
            self.store.clone(),
            DiscordNotifier { http },
            self.clock.clone(),
            self.format.clone(),
            self.trigger,
        )
        .with_interval(self.interval);

        tokio::spawn(scheduler.run());
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: SerenityContext, ready: serenity::model::gateway::Ready) {
        info!(user = %ready.user.name, "Bot connected");

        if let Err(e) = serenity::all::Command::set_global_commands(&ctx.http, commands()).await {
            error!(error = %e, "Failed to register commands");
        } else {
            info!("Slash commands registered");
        }

        self.start_scheduler(ctx.http.clone());
    }

    async fn interaction_create(&self, ctx: SerenityContext, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = self.handle_command(&ctx, &command).await {
                    error!(error = %e, command = %command.data.name, "Command error");
                    if let Err(e) = command
                        .create_response(&ctx.http, error_response(&e))
                        .await
                    {
                        error!(error = %e, "Failed to send error response");
                    }
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = self.handle_component(&ctx, &component).await {
                    error!(error = %e, custom_id = %component.data.custom_id, "Button error");
                    if let Err(e) = component
                        .create_response(&ctx.http, error_response(&e))
                        .await
                    {
                        error!(error = %e, "Failed to send error response");
                    }
                }
            }
            _ => {}
        }
    }
}

fn commands() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("start").description("Show help and the menu"),
        CreateCommand::new("menu").description("Show the menu buttons"),
        CreateCommand::new("setdate")
            .description("Set the target date")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "date",
                    "2025-09-10 or 10.09.2025",
                )
                .required(true),
            ),
        CreateCommand::new("tz")
            .description("Set the time zone as a UTC offset")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "offset", "e.g. +04:00")
                    .required(true),
            ),
        CreateCommand::new("left").description("Show how many days are left"),
        CreateCommand::new("when").description("Show the target date"),
        CreateCommand::new("notify").description("Turn the daily message on or off"),
        CreateCommand::new("clear").description("Clear the target date"),
    ]
}

/// スラッシュコマンドを操作に変換する。
fn parse_command(name: &str, argument: Option<&str>) -> Option<Action> {
    let arg = || argument.unwrap_or_default().to_string();
    let action = match name {
        "start" => Action::Start,
        "menu" => Action::Menu,
        "setdate" => Action::SetDate(arg()),
        "tz" => Action::Tz(arg()),
        "left" => Action::Left,
        "when" => Action::When,
        "notify" => Action::Notify,
        "clear" => Action::Clear,
        _ => return None,
    };
    Some(action)
}

fn build_response(reply: &Reply) -> CreateInteractionResponse {
    let mut message = CreateInteractionResponseMessage::new().content(&reply.text);

    if let Some(menu) = reply.menu {
        let buttons = menu
            .buttons()
            .into_iter()
            .map(|(button, label)| {
                CreateButton::new(button.custom_id())
                    .label(label)
                    .style(ButtonStyle::Secondary)
            })
            .collect();
        message = message.components(vec![CreateActionRow::Buttons(buttons)]);
    }

    match reply.kind {
        ReplyKind::Send => CreateInteractionResponse::Message(message),
        ReplyKind::Edit => CreateInteractionResponse::UpdateMessage(message),
        ReplyKind::Notice => CreateInteractionResponse::Message(message.ephemeral(true)),
    }
}

fn error_response(e: &anyhow::Error) -> CreateInteractionResponse {
    let response = CreateInteractionResponseMessage::new()
        .content(format!("Error: {}", e))
        .ephemeral(true);
    CreateInteractionResponse::Message(response)
}

pub async fn run(config: Config, store: SharedStore) -> Result<()> {
    let intents = GatewayIntents::GUILDS;
    let handler = Handler::new(&config, store)?;

    let mut client = Client::builder(&config.discord.token, intents)
        .event_handler(handler)
        .await
        .context("Failed to create client")?;

    info!("Starting bot");
    client.start().await.context("Client error")?;

    Ok(())
}
