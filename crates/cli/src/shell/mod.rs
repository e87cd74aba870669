//! Line-driven dual-pane shell
//!
//! Reads one command per line and feeds it to the dispatcher. Transfers and
//! listings run on background tasks; the loop applies finished listings and
//! polls transfer progress between lines, so input stays responsive while
//! either runs. A command that reads a pane still changing location waits in
//! a queue, in order with the commands after it, until the listing lands;
//! `help`, `ls` and `cancel` are answered at once.

mod parse;

use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;

use sc_core::{Command, DispatchState, Dispatcher, Error, Loaded, Response, TransferResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::exit_code::ExitCode;
use crate::output::{render_pane, render_result, render_snapshot, OutputConfig, ProgressBar, RenderOptions};

pub use parse::{parse_line, Input, HELP};

/// How often a running transfer is polled
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Interactive driver around a [`Dispatcher`]
pub struct Shell<W: Write> {
    dispatcher: Dispatcher,
    out: W,
    render: RenderOptions,
    output: OutputConfig,
    progress: Option<ProgressBar>,
    /// Commands waiting for a pane to finish loading
    deferred: VecDeque<Command>,
    exit: ExitCode,
}

impl<W: Write> Shell<W> {
    pub fn new(dispatcher: Dispatcher, out: W, render: RenderOptions, output: OutputConfig) -> Self {
        Self {
            dispatcher,
            out,
            render,
            output,
            progress: None,
            deferred: VecDeque::new(),
            exit: ExitCode::Success,
        }
    }

    /// Run until `quit` or end of input, then wait for any running transfer
    ///
    /// At end of input queued commands still run; `quit` drops them.
    /// Returns the exit code of the most recent failure, or success.
    pub async fn run<R>(mut self, input: R) -> (ExitCode, W)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut tick = tokio::time::interval(POLL_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.show();
        loop {
            tokio::select! {
                biased;
                loaded = self.dispatcher.next_loaded(), if self.dispatcher.is_loading() => {
                    if let Some(loaded) = loaded {
                        self.loaded(loaded);
                    }
                    self.run_deferred().await;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if !self.handle_line(&line).await {
                            self.deferred.clear();
                            self.dispatcher.cancel_loads();
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.fail(&Error::Io(e));
                        break;
                    }
                },
                _ = tick.tick(), if self.transfer_running() => self.poll().await,
            }
        }

        self.wait().await;
        (self.exit, self.out)
    }

    fn transfer_running(&self) -> bool {
        self.dispatcher.state() == DispatchState::TransferInProgress
    }

    /// Handle one line; `false` ends the session
    async fn handle_line(&mut self, line: &str) -> bool {
        let input = match parse_line(line) {
            Ok(Some(input)) => input,
            Ok(None) => return true,
            Err(e) => {
                self.fail(&e);
                return true;
            }
        };
        debug!(?input, "Shell input");

        match input {
            Input::Quit => return false,
            Input::Help => self.say(HELP),
            Input::Show => self.show(),
            Input::Wait => self.wait().await,
            Input::Command(command) => self.command(command).await,
        }
        true
    }

    async fn command(&mut self, command: Command) {
        if command == Command::Cancel && !self.deferred.is_empty() {
            debug!(dropped = self.deferred.len(), "Dropping queued commands");
            self.deferred.clear();
        }
        if !self.deferred.is_empty() || self.dispatcher.is_blocked(&command) {
            debug!(?command, "Queued until the pane has loaded");
            self.deferred.push_back(command);
            return;
        }
        self.dispatch(command).await;
    }

    async fn dispatch(&mut self, command: Command) {
        match self.dispatcher.dispatch(command).await {
            Ok(response) => self.respond(response),
            Err(e) => self.fail(&e),
        }
    }

    /// Run queued commands until one has to wait for a listing again
    async fn run_deferred(&mut self) {
        while let Some(command) = self.deferred.front() {
            if self.dispatcher.is_blocked(command) {
                break;
            }
            if let Some(command) = self.deferred.pop_front() {
                self.dispatch(command).await;
            }
        }
    }

    fn loaded(&mut self, loaded: Loaded) {
        match loaded.result {
            Ok(()) if loaded.announce => {
                let active = loaded.side == self.dispatcher.active_side();
                let text = render_pane(&self.dispatcher.pane(loaded.side).snapshot(), active, self.render);
                self.say(&text);
            }
            Err(e) if loaded.announce => self.fail(&e),
            _ => debug!(side = %loaded.side, "Pane reloaded"),
        }
    }

    /// Apply listings as they land and run the commands waiting on them
    async fn catch_up(&mut self) {
        loop {
            self.run_deferred().await;
            if !self.dispatcher.is_loading() {
                break;
            }
            match self.dispatcher.next_loaded().await {
                Some(loaded) => self.loaded(loaded),
                None => break,
            }
        }
    }

    fn respond(&mut self, response: Response) {
        match response {
            Response::Updated => {
                let active = self.dispatcher.active_side();
                let text = render_pane(&self.dispatcher.pane(active).snapshot(), true, self.render);
                self.say(&text);
            }
            Response::Loading { location, .. } => self.say(&format!("Loading {location} ...")),
            Response::ConfirmationRequired(prompt) => self.say(&format!("{prompt} [y/N]")),
            Response::TransferStarted { kind, sources } => {
                self.say(&format!("{kind} started: {sources} source(s)"));
                self.progress = Some(ProgressBar::spinner(&self.output, kind));
            }
            Response::View { bucket, key, text } => {
                self.say(&format!("--- {bucket}/{key} ---"));
                self.say(text.trim_end());
                self.say("---");
            }
            Response::Message(message) => self.say(&message),
            Response::Cancelled => self.say("Cancelled"),
        }
    }

    fn show(&mut self) {
        let snapshot = self.dispatcher.snapshot();
        if self.output.json {
            match serde_json::to_string(&snapshot) {
                Ok(json) => self.say(&json),
                Err(e) => self.fail(&Error::Json(e)),
            }
            return;
        }
        let text = render_snapshot(&snapshot, self.render);
        self.say(&text);
    }

    /// Drain progress and finish the transfer if it is done
    async fn poll(&mut self) {
        self.drain_progress();
        match self.dispatcher.try_complete_transfer().await {
            Ok(Some(result)) => self.finished(&result),
            Ok(None) => {}
            Err(e) => self.transfer_failed(&e),
        }
    }

    /// Wait for pending listings, queued commands and the running transfer
    async fn wait(&mut self) {
        self.catch_up().await;
        if !self.transfer_running() {
            return;
        }
        self.drain_progress();
        match self.dispatcher.wait_transfer().await {
            Ok(Some(result)) => {
                self.drain_progress();
                self.finished(&result);
            }
            Ok(None) => {}
            Err(e) => self.transfer_failed(&e),
        }
    }

    fn drain_progress(&mut self) {
        let items = self.dispatcher.poll_progress();
        if let Some(progress) = self.progress.as_mut() {
            for item in &items {
                progress.record(item);
            }
        }
    }

    fn finished(&mut self, result: &TransferResult) {
        if let Some(progress) = self.progress.take() {
            progress.finish_and_clear();
        }
        let code = ExitCode::for_result(result);
        if code != ExitCode::Success {
            self.exit = code;
        }
        let text = render_result(result, self.render);
        self.say(&text);
    }

    fn transfer_failed(&mut self, err: &Error) {
        if let Some(progress) = self.progress.take() {
            progress.finish_and_clear();
        }
        self.fail(err);
    }

    fn fail(&mut self, err: &Error) {
        self.exit = ExitCode::for_error(err);
        let text = format!("error: {err}");
        let text = if self.render.colors {
            console::style(text).red().to_string()
        } else {
            text
        };
        self.say(&text);
    }

    fn say(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            warn!(error = %e, "Could not write shell output");
        }
    }
}
