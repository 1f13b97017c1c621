//! Terminal front end
//!
//! A line-based REPL over [`ChatEngine`]. Streamed text is printed as it
//! arrives; when the finished reply differs from what was streamed (tag
//! hidden, tool result appended) the final version is printed as well.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{info, warn};

use crate::chat::{ChatEngine, ChatSession, Role, TurnUpdate};
use crate::protocol::HideToggle;

const PROMPT: &str = "你> ";
const ASSISTANT_LABEL: &str = "CFO> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Submit(String),
    Hide(bool),
    Reset,
    History,
    Help,
    Quit,
    Invalid(String),
    Empty,
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if !line.starts_with('/') {
            return Self::Submit(line.to_string());
        }

        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("/hide"), Some("on")) => Self::Hide(true),
            (Some("/hide"), Some("off")) => Self::Hide(false),
            (Some("/reset"), None) => Self::Reset,
            (Some("/history"), None) => Self::History,
            (Some("/help"), None) => Self::Help,
            (Some("/quit" | "/exit"), None) => Self::Quit,
            _ => Self::Invalid(line.to_string()),
        }
    }
}

const HELP: &str = "\
命令：
  /hide on|off   隐藏或显示 [[TOOLS:...]] 指令
  /reset         清空对话
  /history       以 JSON 输出对话
  /quit          退出（空闲时按 Ctrl-C 亦可）
生成过程中按 Ctrl-C 停止等待。";

/// Prints the trailing assistant turn as it grows
#[derive(Debug, Default)]
pub struct ReplyRenderer {
    printed: String,
}

impl ReplyRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write whatever `update` adds to the reply
    pub fn render<W: Write>(&mut self, out: &mut W, update: &TurnUpdate) -> io::Result<()> {
        let Some(turn) = update.transcript.last().filter(|t| t.role == Role::Assistant) else {
            return Ok(());
        };
        let content = turn.content.as_str();

        if self.printed.is_empty() && !content.is_empty() {
            write!(out, "{}", ASSISTANT_LABEL)?;
        }

        if update.is_generating {
            if let Some(delta) = content.strip_prefix(self.printed.as_str()) {
                write!(out, "{}", delta)?;
                self.printed = content.to_string();
            }
        } else if content != self.printed {
            if self.printed.is_empty() {
                writeln!(out, "{}", content)?;
            } else {
                writeln!(out)?;
                writeln!(out, "{}{}", ASSISTANT_LABEL, content)?;
            }
            self.printed = content.to_string();
        } else {
            writeln!(out)?;
        }
        out.flush()
    }
}

/// What the idle prompt received
#[derive(Debug, PartialEq, Eq)]
pub enum PromptInput {
    /// A line, or `None` at end of input
    Line(Option<String>),
    /// Ctrl-C while no turn was running
    Interrupt,
}

/// Wait for the next line or for `interrupt`, whichever comes first
///
/// A failing interrupt listener is logged and the wait continues on input
/// alone.
pub async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> io::Result<PromptInput>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        biased;
        signal = interrupt => match signal {
            Ok(()) => Ok(PromptInput::Interrupt),
            Err(e) => {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                Ok(PromptInput::Line(lines.next_line().await?))
            }
        },
        line = lines.next_line() => Ok(PromptInput::Line(line?)),
    }
}

/// Interactive loop until `/quit`, Ctrl-C at the prompt, or end of input
pub async fn run_repl(engine: ChatEngine, session: Arc<ChatSession>, hide: HideToggle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    println!("问CFO：财务智能聊天。输入 /help 查看命令。");
    loop {
        print!("{}", PROMPT);
        stdout.flush()?;

        let line = match next_input(&mut lines, tokio::signal::ctrl_c()).await? {
            PromptInput::Line(Some(line)) => line,
            PromptInput::Line(None) => break,
            PromptInput::Interrupt => {
                println!();
                info!("Interrupted at prompt, exiting");
                break;
            }
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Hide(on) => {
                hide.set(on);
                info!(hide = on, "Directive hiding toggled");
                println!("隐藏TOOLS指令：{}", if on { "开" } else { "关" });
            }
            ReplCommand::Reset => {
                session.reset();
                println!("对话已清空。");
            }
            ReplCommand::History => println!("{}", session.transcript().to_json()?),
            ReplCommand::Invalid(cmd) => println!("未知命令：{}（输入 /help 查看命令）", cmd),
            ReplCommand::Submit(message) => {
                drive_turn(&engine, session.clone(), message, &mut stdout).await?;
            }
        }
    }
    Ok(())
}

/// Render one turn; Ctrl-C frees the session and leaves the turn running
/// unattended
async fn drive_turn<W: Write>(
    engine: &ChatEngine,
    session: Arc<ChatSession>,
    message: String,
    out: &mut W,
) -> Result<()> {
    let mut stream = Box::pin(engine.respond(session.clone(), message));
    let mut renderer = ReplyRenderer::new();
    let mut stopped = false;
    let mut listen = true;

    loop {
        tokio::select! {
            update = stream.next() => {
                let Some(update) = update else { break };
                if !update.input.is_empty() {
                    writeln!(out, "（正在生成回复，请稍候）")?;
                    continue;
                }
                renderer.render(out, &update)?;
            }
            signal = tokio::signal::ctrl_c(), if listen => {
                match signal {
                    Ok(()) => stopped = true,
                    Err(e) => {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                        listen = false;
                    }
                }
            }
        }

        if stopped {
            session.stop();
            writeln!(out, "\n（已停止等待，本轮回复将在后台完成）")?;
            tokio::spawn(async move { while stream.next().await.is_some() {} });
            break;
        }
    }
    Ok(())
}
