//! Dam1021 -- the driver tying the uManager protocol to a [`Transport`].
//!
//! The driver owns the transport exclusively and keeps a two-state
//! session model (`Closed`/`Open`) that mirrors the console's interactive
//! mode. Every operation routes through the session state machine first,
//! then drives the poller; nothing is ever sent while the session state
//! is unknown.
//!
//! The console gives no reliable way to ask "am I already in a session?",
//! so entry is detected optimistically (send the invocation, poll for the
//! prompt) with a forced fallback (send a bare terminator to shake a
//! fresh prompt loose). Exit is idempotent: a device that already dropped
//! out of its session on its own counts as closed.

use std::time::Duration;

use damlib_core::error::{Error, Result};
use damlib_core::transport::Transport;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::commands::{self, ListingScope, OperatingMode};
use crate::filters::{FilterBank, FilterSet};
use crate::poller::{self, poll, PollBudget};
use crate::protocol;
use crate::xmodem;

/// Whether the console's interactive session is currently open.
///
/// Mutated only by [`Dam1021::open_session`] / [`Dam1021::close_session`];
/// it reflects the device's actual mode as far as the prompt/banner
/// matching can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
}

/// A connected dam1021 DAC.
///
/// Constructed via [`Dam1021Builder`](crate::builder::Dam1021Builder).
/// All device communication goes through the [`Transport`] provided at
/// build time; operations execute strictly one after another on it.
pub struct Dam1021 {
    transport: Box<dyn Transport>,
    base_timeout: Duration,
    /// Force a session close before commands issued at the normal
    /// prompt. Extra safeguard for devices of unknown state.
    cautious: bool,
    session: SessionState,
}

impl Dam1021 {
    pub(crate) fn new(transport: Box<dyn Transport>, base_timeout: Duration, cautious: bool) -> Self {
        Dam1021 {
            transport,
            base_timeout,
            cautious,
            session: SessionState::Closed,
        }
    }

    /// The current session state.
    pub fn session_state(&self) -> SessionState {
        self.session
    }

    // -------------------------------------------------------------------
    // Session state machine
    // -------------------------------------------------------------------

    /// Open the uManager session. No-op when already open.
    ///
    /// Sends the invocation sequence and polls for the prompt. If the
    /// device was already mid-session the invocation echoes nothing new,
    /// so a bare line terminator is sent to force a fresh prompt before
    /// giving up.
    pub async fn open_session(&mut self) -> Result<()> {
        if self.session == SessionState::Open {
            return Ok(());
        }

        debug!("opening uManager session");
        self.transport.send(protocol::SESSION_INVOCATION).await?;
        let budget = PollBudget::scaled(self.base_timeout, poller::SESSION_OPEN_COEFF);
        if poll(self.transport.as_mut(), &budget, protocol::prompt_ready, None).await? {
            self.session = SessionState::Open;
            debug!("uManager session open");
            return Ok(());
        }

        debug!("no prompt after invocation, forcing a fresh one");
        self.transport
            .send(protocol::LINE_TERMINATOR.as_bytes())
            .await?;
        let budget = PollBudget::base(self.base_timeout);
        if poll(self.transport.as_mut(), &budget, protocol::prompt_ready, None).await? {
            self.session = SessionState::Open;
            debug!("uManager session open");
            return Ok(());
        }

        Err(Error::SessionOpenFailed)
    }

    /// Close the uManager session. No-op when not open, unless `force`d.
    ///
    /// Always leaves the state `Closed` once an attempt completes: a
    /// device that produces no prompt is treated as having dropped out of
    /// the session on its own.
    pub async fn close_session(&mut self, force: bool) -> Result<()> {
        if self.session != SessionState::Open && !force {
            return Ok(());
        }

        // Shake a fresh prompt loose before typing the termination
        // command into an unknown line state.
        self.transport
            .send(protocol::LINE_TERMINATOR.as_bytes())
            .await?;
        let budget = PollBudget::base(self.base_timeout);
        let prompted = poll(self.transport.as_mut(), &budget, protocol::prompt_ready, None).await?;

        if !prompted {
            debug!("no prompt, treating session as already closed");
            self.session = SessionState::Closed;
            return Ok(());
        }

        self.transport
            .send(&commands::encode_line(protocol::SESSION_TERMINATION))
            .await?;
        let closed = poll(
            self.transport.as_mut(),
            &budget,
            protocol::session_closed,
            None,
        )
        .await?;

        self.session = SessionState::Closed;
        if closed {
            debug!("uManager session closed");
            Ok(())
        } else {
            Err(Error::SessionCloseFailed)
        }
    }

    // -------------------------------------------------------------------
    // Immediate commands (self-echoing, issued at the normal prompt)
    // -------------------------------------------------------------------

    /// Set the current volume level. Not to be confused with the level
    /// stored in flash.
    ///
    /// Accepts [`VOLUME_MIN`](commands::VOLUME_MIN)..=[`VOLUME_MAX`](commands::VOLUME_MAX)
    /// or the potentiometer sentinel.
    pub async fn set_current_volume(&mut self, level: i16) -> Result<()> {
        let command = commands::current_volume(level)?;
        self.execute_echoed(&command).await?;
        info!(level, "current volume level set");
        Ok(())
    }

    /// Select the input source.
    pub async fn set_input_source(&mut self, index: u8) -> Result<()> {
        let command = commands::input_source(index)?;
        self.execute_echoed(&command).await?;
        info!(index, "input source set");
        Ok(())
    }

    /// Select the current filter set. Not persisted across power-up.
    pub async fn set_current_filter(&mut self, set: FilterSet) -> Result<()> {
        let command = commands::current_filter(set);
        self.execute_echoed(&command).await?;
        info!(filter = %set, "current filter set selected");
        Ok(())
    }

    /// Send a command whose success signal is the console echoing it
    /// back, with a bounded resend count.
    async fn execute_echoed(&mut self, command: &str) -> Result<()> {
        if self.cautious {
            // These commands live at the normal prompt, outside the
            // session.
            self.close_session(true).await?;
        }

        let budget = PollBudget::base(self.base_timeout);
        for attempt in 1..=commands::SELF_ECHO_TRIES {
            if attempt > 1 {
                debug!(command, attempt, "command not echoed, resending");
            }
            self.transport.send(&commands::encode_line(command)).await?;
            let echoed = poll(
                self.transport.as_mut(),
                &budget,
                |buf| protocol::echoes_command(buf, command),
                None,
            )
            .await?;
            if echoed {
                return Ok(());
            }
        }

        Err(Error::RetryExhausted(command.to_string()))
    }

    // -------------------------------------------------------------------
    // Flash settings (session-scoped, non-echoing)
    // -------------------------------------------------------------------

    /// Store a volume level in flash. The current volume is set to this
    /// value during power-up.
    pub async fn set_flash_volume(&mut self, level: i16) -> Result<()> {
        let command = commands::flash_volume(level)?;
        self.execute_flash(&command).await?;
        info!(level, "flash volume level set");
        Ok(())
    }

    /// Store a filter set selection in flash.
    pub async fn set_flash_filter(&mut self, set: FilterSet) -> Result<()> {
        let command = commands::flash_filter(set);
        self.execute_flash(&command).await?;
        info!(filter = %set, "flash filter set stored");
        Ok(())
    }

    /// Store the operating mode in flash.
    pub async fn set_operating_mode(&mut self, mode: OperatingMode) -> Result<()> {
        let command = commands::operating_mode(mode);
        self.execute_flash(&command).await?;
        info!(mode = %mode, "operating mode stored");
        Ok(())
    }

    /// Run a `set ...` command inside a session. The console does not
    /// positively acknowledge these; absence of its error text within
    /// the budget is the success signal. The session is closed again
    /// afterwards either way.
    async fn execute_flash(&mut self, command: &str) -> Result<()> {
        self.open_session().await?;
        let outcome = self.flash_command(command).await;
        self.close_after(outcome).await
    }

    async fn flash_command(&mut self, command: &str) -> Result<()> {
        self.transport.send(&commands::encode_line(command)).await?;
        let budget = PollBudget::base(self.base_timeout);
        let rejected = poll(
            self.transport.as_mut(),
            &budget,
            protocol::reports_error,
            None,
        )
        .await?;
        if rejected {
            Err(Error::DeviceRejected(command.to_string()))
        } else {
            Ok(())
        }
    }

    // -------------------------------------------------------------------
    // Filter listings
    // -------------------------------------------------------------------

    /// Retrieve and parse the filter listing for a scope.
    ///
    /// The model is rebuilt from the device on every call; nothing is
    /// cached.
    pub async fn list_filters(&mut self, scope: ListingScope) -> Result<FilterBank> {
        let text = self.capture_listing(scope).await?;
        Ok(FilterBank::parse(&text))
    }

    /// Retrieve the filter listing verbatim, minus the trailing prompt.
    pub async fn list_filters_raw(&mut self, scope: ListingScope) -> Result<String> {
        self.capture_listing(scope).await
    }

    async fn capture_listing(&mut self, scope: ListingScope) -> Result<String> {
        self.open_session().await?;
        let outcome = self.run_listing(scope).await;
        self.close_after(outcome).await
    }

    async fn run_listing(&mut self, scope: ListingScope) -> Result<String> {
        let command = commands::listing(scope);
        self.transport.send(&commands::encode_line(command)).await?;

        let budget = PollBudget::scaled(self.base_timeout, poller::LISTING_COEFF);
        let mut captured = String::new();
        let mut observer = |_matched: bool, buffer: &[u8]| {
            captured = String::from_utf8_lossy(buffer).into_owned();
        };
        let matched = poll(
            self.transport.as_mut(),
            &budget,
            protocol::prompt_ready,
            Some(&mut observer),
        )
        .await?;
        if !matched {
            return Err(Error::ListingFailed);
        }

        let text = captured
            .strip_suffix(protocol::PROMPT)
            .unwrap_or(&captured)
            .to_string();
        Ok(text)
    }

    // -------------------------------------------------------------------
    // Image download
    // -------------------------------------------------------------------

    /// Push a firmware or filter image to the device.
    ///
    /// Drives the download command, the block transfer, and the
    /// reprogram-acknowledgement poll, and returns the SHA-1 hex digest
    /// of the exact bytes sent -- proof of what was written, produced
    /// only after the device confirmed reprogramming.
    ///
    /// With `update_after`, the self-update handshake runs instead of a
    /// normal session close and the device is left resetting into the
    /// new firmware.
    pub async fn download(&mut self, payload: &[u8], update_after: bool) -> Result<String> {
        self.open_session().await?;

        let outcome = self.push_image(payload).await;
        match outcome {
            Ok(digest) if update_after => {
                self.run_update().await?;
                Ok(digest)
            }
            outcome => self.close_after(outcome).await,
        }
    }

    async fn push_image(&mut self, payload: &[u8]) -> Result<String> {
        self.transport
            .send(&commands::encode_line(commands::DOWNLOAD))
            .await?;
        let budget = PollBudget::base(self.base_timeout);
        let ready = poll(
            self.transport.as_mut(),
            &budget,
            protocol::transfer_ready,
            None,
        )
        .await?;
        if !ready {
            return Err(Error::TransferNotReady);
        }

        xmodem::send(self.transport.as_mut(), payload, self.base_timeout).await?;
        info!(bytes = payload.len(), "image data sent");

        let budget = PollBudget::scaled(self.base_timeout, poller::REPROGRAM_COEFF);
        let acknowledged = poll(
            self.transport.as_mut(),
            &budget,
            |buf| protocol::contains_ignore_case(buf, protocol::REPROGRAM_ACK),
            None,
        )
        .await?;
        if !acknowledged {
            return Err(Error::TransferNotAcknowledged);
        }

        let digest = hex::encode(Sha1::digest(payload));
        info!(digest = %digest, "device reprogrammed");
        Ok(digest)
    }

    /// Run the self-update handshake after a firmware download. The
    /// device resets on success, so no session close follows.
    async fn run_update(&mut self) -> Result<()> {
        self.transport
            .send(&commands::encode_line(commands::UPDATE))
            .await?;
        let budget = PollBudget::scaled(self.base_timeout, poller::UPDATE_CONFIRM_COEFF);
        let confirmed = poll(
            self.transport.as_mut(),
            &budget,
            |buf| protocol::contains_ignore_case(buf, protocol::UPDATE_CONFIRM),
            None,
        )
        .await?;
        if !confirmed {
            return Err(Error::UpdateHandshakeFailed(
                "confirmation prompt never appeared".into(),
            ));
        }

        self.transport.send(protocol::UPDATE_ACK).await?;
        // The device resets from here; the session is gone regardless of
        // what the final poll sees.
        self.session = SessionState::Closed;

        let resetting = poll(
            self.transport.as_mut(),
            &budget,
            |buf| protocol::contains_ignore_case(buf, protocol::RESET_ACK),
            None,
        )
        .await?;
        if !resetting {
            return Err(Error::UpdateHandshakeFailed(
                "reset acknowledgement never appeared".into(),
            ));
        }

        info!("device accepted the update and is resetting");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    /// Close the connection: leave any open session, then close the
    /// transport.
    pub async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.close_session(false).await {
            debug!(error = %e, "session close during shutdown failed");
        }
        self.transport.close().await?;
        debug!("connection closed");
        Ok(())
    }

    /// Restore the session to `Closed` after an operation, preserving
    /// the operation's outcome. A close failure only surfaces when the
    /// operation itself succeeded.
    async fn close_after<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.close_session(false).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(close_err) = self.close_session(false).await {
                    debug!(error = %close_err, "session close after failed operation also failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Dam1021Builder;
    use damlib_test_harness::ScriptedTransport;

    /// Short base timeout so miss-path polls stay fast.
    const TEST_TIMEOUT: Duration = Duration::from_millis(60);

    fn dac_with(mock: ScriptedTransport) -> Dam1021 {
        Dam1021Builder::new()
            .base_timeout(TEST_TIMEOUT)
            .build_with_transport(Box::new(mock))
    }

    fn cautious_dac_with(mock: ScriptedTransport) -> Dam1021 {
        Dam1021Builder::new()
            .base_timeout(TEST_TIMEOUT)
            .cautious(true)
            .build_with_transport(Box::new(mock))
    }

    /// Script a successful session open.
    fn script_open(mock: &mut ScriptedTransport) {
        mock.expect(b"+++", b"\r\nuManager v1.11\r\n# ");
    }

    /// Script a successful session close.
    fn script_close(mock: &mut ScriptedTransport) {
        mock.expect(b"\r", b"\r\n# ");
        mock.expect(b"exit\r", b"exit\r\n");
    }

    // -------------------------------------------------------------------
    // Session open
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn open_session_on_prompt() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);

        let mut dac = dac_with(mock);
        dac.open_session().await.unwrap();
        assert_eq!(dac.session_state(), SessionState::Open);
    }

    #[tokio::test]
    async fn open_session_is_idempotent() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);

        let mut dac = dac_with(mock);
        dac.open_session().await.unwrap();
        // The script is exhausted: any further I/O would error, so a
        // clean second open proves it was a no-op.
        dac.open_session().await.unwrap();
        assert_eq!(dac.session_state(), SessionState::Open);
    }

    #[tokio::test]
    async fn open_session_forces_fresh_prompt() {
        let mut mock = ScriptedTransport::new();
        // Already mid-session: the invocation echoes nothing new.
        mock.expect(b"+++", b"");
        mock.expect(b"\r", b"\r\n# ");

        let mut dac = dac_with(mock);
        dac.open_session().await.unwrap();
        assert_eq!(dac.session_state(), SessionState::Open);
    }

    #[tokio::test]
    async fn open_session_failure() {
        let mut mock = ScriptedTransport::new();
        mock.expect(b"+++", b"");
        mock.expect(b"\r", b"garbage with no prompt");

        let mut dac = dac_with(mock);
        let result = dac.open_session().await;
        assert!(matches!(result, Err(Error::SessionOpenFailed)));
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    // -------------------------------------------------------------------
    // Session close
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn close_session_noop_when_closed() {
        let mock = ScriptedTransport::new();
        let mut dac = dac_with(mock);
        dac.close_session(false).await.unwrap();
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn close_session_full_exchange() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        script_close(&mut mock);

        let mut dac = dac_with(mock);
        dac.open_session().await.unwrap();
        dac.close_session(false).await.unwrap();
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn close_session_silent_device_counts_as_closed() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        // The device dropped out on its own: no prompt for the bare
        // terminator.
        mock.expect(b"\r", b"");

        let mut dac = dac_with(mock);
        dac.open_session().await.unwrap();
        dac.close_session(false).await.unwrap();
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn close_session_missing_banner_errors_but_closes() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect(b"\r", b"\r\n# ");
        mock.expect(b"exit\r", b"something unexpected");

        let mut dac = dac_with(mock);
        dac.open_session().await.unwrap();
        let result = dac.close_session(false).await;
        assert!(matches!(result, Err(Error::SessionCloseFailed)));
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn close_session_forced_runs_when_closed() {
        let mut mock = ScriptedTransport::new();
        mock.expect(b"\r", b"");

        let mut dac = dac_with(mock);
        dac.close_session(true).await.unwrap();
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    // -------------------------------------------------------------------
    // Self-echoing commands
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn set_current_volume_confirmed_by_echo() {
        let mut mock = ScriptedTransport::new();
        mock.expect(b"V-14\r", b"V-14\r\n");

        let mut dac = dac_with(mock);
        dac.set_current_volume(-14).await.unwrap();
    }

    #[tokio::test]
    async fn set_current_volume_out_of_range_sends_nothing() {
        // An empty script fails any write, so a clean range error proves
        // zero bytes hit the transport.
        let mut dac = dac_with(ScriptedTransport::new());
        for level in [16, -100, 42] {
            let result = dac.set_current_volume(level).await;
            assert!(matches!(result, Err(Error::OutOfRange(_))));
        }
    }

    #[tokio::test]
    async fn set_current_volume_potentiometer_sentinel() {
        let mut mock = ScriptedTransport::new();
        mock.expect(b"V+99\r", b"V+99\r\n");

        let mut dac = dac_with(mock);
        dac.set_current_volume(commands::VOLUME_POTENTIOMETER)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn set_current_volume_resends_once() {
        let mut mock = ScriptedTransport::new();
        mock.expect(b"V-14\r", b"");
        mock.expect(b"V-14\r", b"V-14\r\n");

        let mut dac = dac_with(mock);
        dac.set_current_volume(-14).await.unwrap();
    }

    #[tokio::test]
    async fn set_current_volume_retries_exhausted() {
        let mut mock = ScriptedTransport::new();
        mock.expect(b"V-14\r", b"");
        mock.expect(b"V-14\r", b"junk");

        let mut dac = dac_with(mock);
        let result = dac.set_current_volume(-14).await;
        assert!(matches!(result, Err(Error::RetryExhausted(_))));
    }

    #[tokio::test]
    async fn set_input_source_confirmed_by_echo() {
        let mut mock = ScriptedTransport::new();
        mock.expect(b"I1\r", b"I1\r\n");

        let mut dac = dac_with(mock);
        dac.set_input_source(1).await.unwrap();
    }

    #[tokio::test]
    async fn set_input_source_out_of_range() {
        let mut dac = dac_with(ScriptedTransport::new());
        let result = dac.set_input_source(3).await;
        assert!(matches!(result, Err(Error::OutOfRange(_))));
    }

    #[tokio::test]
    async fn set_current_filter_uses_device_code() {
        let mut mock = ScriptedTransport::new();
        mock.expect(b"F4\r", b"F4\r\n");

        let mut dac = dac_with(mock);
        dac.set_current_filter(FilterSet::Linear).await.unwrap();
    }

    #[tokio::test]
    async fn cautious_connection_closes_session_first() {
        let mut mock = ScriptedTransport::new();
        // The forced close probes with a bare terminator; the silent
        // reply means "already closed".
        mock.expect(b"\r", b"");
        mock.expect(b"V-14\r", b"V-14\r\n");

        let mut dac = cautious_dac_with(mock);
        dac.set_current_volume(-14).await.unwrap();
    }

    // -------------------------------------------------------------------
    // Flash settings
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn set_flash_volume_silence_is_success() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect(b"set volume=-22\r", b"set volume=-22\r\n");
        script_close(&mut mock);

        let mut dac = dac_with(mock);
        dac.set_flash_volume(-22).await.unwrap();
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn set_flash_volume_rejected() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect(b"set volume=-22\r", b"Invalid command\r\n");
        script_close(&mut mock);

        let mut dac = dac_with(mock);
        let result = dac.set_flash_volume(-22).await;
        assert!(matches!(result, Err(Error::DeviceRejected(_))));
        // The session was still restored to closed.
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn set_flash_volume_validates_before_io() {
        let mut dac = dac_with(ScriptedTransport::new());
        let result = dac.set_flash_volume(50).await;
        assert!(matches!(result, Err(Error::OutOfRange(_))));
    }

    #[tokio::test]
    async fn set_flash_filter_sends_symbolic_name() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect(b"set filter=linear\r", b"set filter=linear\r\n");
        script_close(&mut mock);

        let mut dac = dac_with(mock);
        dac.set_flash_filter(FilterSet::Linear).await.unwrap();
    }

    #[tokio::test]
    async fn set_operating_mode_round_trip() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect(b"set mode=inverted\r", b"set mode=inverted\r\n");
        script_close(&mut mock);

        let mut dac = dac_with(mock);
        dac.set_operating_mode(OperatingMode::Inverted).await.unwrap();
    }

    // -------------------------------------------------------------------
    // Filter listings
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn list_filters_parses_and_closes() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect_chunks(
            b"lsf\r",
            &[b"lsf\r\n", b"4 foo\r\n5 bar\r\n", b"12 baz\r\n# "],
        );
        script_close(&mut mock);

        let mut dac = dac_with(mock);
        let model = dac.list_filters(ListingScope::Current).await.unwrap();

        let bank2 = model.fir().get(&2).expect("bank 2 missing");
        assert_eq!(
            bank2.get(&FilterSet::Linear).unwrap(),
            &vec![(4, "foo".to_string())]
        );
        assert_eq!(
            bank2.get(&FilterSet::Mixed).unwrap(),
            &vec![(5, "bar".to_string())]
        );
        assert_eq!(model.iir().get(&12).unwrap(), &vec!["baz".to_string()]);
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn list_filters_all_uses_wide_command() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect(b"lsf all\r", b"lsf all\r\n12 baz\r\n# ");
        script_close(&mut mock);

        let mut dac = dac_with(mock);
        let model = dac.list_filters(ListingScope::All).await.unwrap();
        assert_eq!(model.iir().get(&12).unwrap(), &vec!["baz".to_string()]);
    }

    #[tokio::test]
    async fn list_filters_raw_strips_trailing_prompt() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect(b"lsf\r", b"lsf\r\n4 foo\r\n# ");
        script_close(&mut mock);

        let mut dac = dac_with(mock);
        let raw = dac.list_filters_raw(ListingScope::Current).await.unwrap();
        assert_eq!(raw, "lsf\r\n4 foo\r\n");
    }

    #[tokio::test]
    async fn list_filters_without_prompt_fails() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect(b"lsf\r", b"lsf\r\n4 foo\r\n");
        // The close attempt after the failure probes the line again.
        mock.expect(b"\r", b"");

        let mut dac = dac_with(mock);
        let result = dac.list_filters(ListingScope::Current).await;
        assert!(matches!(result, Err(Error::ListingFailed)));
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    // -------------------------------------------------------------------
    // Download
    // -------------------------------------------------------------------

    /// SHA-1 of b"abc", the classic test vector.
    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

    fn script_download_exchange(mock: &mut ScriptedTransport) {
        script_open(mock);
        mock.expect(b"download\r", b"download\r\nC");
        mock.expect(&xmodem::build_block(1, b"abc"), &[xmodem::ACK]);
        mock.expect(&[xmodem::EOT], &[xmodem::ACK]);
    }

    #[tokio::test]
    async fn download_returns_payload_digest() {
        let mut mock = ScriptedTransport::new();
        script_download_exchange(&mut mock);
        mock.feed(b"Data programmed in flash\r\n");
        script_close(&mut mock);

        let mut dac = dac_with(mock);
        let digest = dac.download(b"abc", false).await.unwrap();
        assert_eq!(digest, ABC_SHA1);
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn download_not_ready() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect(b"download\r", b"download\r\nno transfer today");
        mock.expect(b"\r", b"");

        let mut dac = dac_with(mock);
        let result = dac.download(b"abc", false).await;
        assert!(matches!(result, Err(Error::TransferNotReady)));
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn download_block_failure_is_protocol_error() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        mock.expect(b"download\r", b"download\r\nC");
        let block = xmodem::build_block(1, b"abc");
        mock.expect_chunks(&block, &[&[xmodem::CAN], &[xmodem::CAN]]);
        mock.expect(b"\r", b"");

        let mut dac = dac_with(mock);
        let result = dac.download(b"abc", false).await;
        assert!(matches!(result, Err(Error::TransferProtocolFailed(_))));
    }

    #[tokio::test]
    async fn download_without_reprogram_ack() {
        let mut mock = ScriptedTransport::new();
        script_download_exchange(&mut mock);
        // No "programmed" text ever arrives.
        mock.expect(b"\r", b"");

        let mut dac = dac_with(mock);
        let result = dac.download(b"abc", false).await;
        assert!(matches!(result, Err(Error::TransferNotAcknowledged)));
    }

    #[tokio::test]
    async fn download_with_update_handshake() {
        let mut mock = ScriptedTransport::new();
        script_download_exchange(&mut mock);
        mock.feed(b"Data programmed in flash\r\n");
        mock.expect(b"update\r", b"Are you sure? (y/n) ");
        mock.expect(b"y", b"Resetting...\r\n");

        let mut dac = dac_with(mock);
        let digest = dac.download(b"abc", true).await.unwrap();
        assert_eq!(digest, ABC_SHA1);
        // The device is resetting; no exit command was sent.
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn update_without_confirmation_prompt() {
        let mut mock = ScriptedTransport::new();
        script_download_exchange(&mut mock);
        mock.feed(b"Data programmed in flash\r\n");
        mock.expect(b"update\r", b"unexpected output");

        let mut dac = dac_with(mock);
        let result = dac.download(b"abc", true).await;
        assert!(matches!(result, Err(Error::UpdateHandshakeFailed(_))));
    }

    #[tokio::test]
    async fn update_without_reset_ack() {
        let mut mock = ScriptedTransport::new();
        script_download_exchange(&mut mock);
        mock.feed(b"Data programmed in flash\r\n");
        mock.expect(b"update\r", b"Are you sure? (y/n) ");
        mock.expect(b"y", b"");

        let mut dac = dac_with(mock);
        let result = dac.download(b"abc", true).await;
        assert!(matches!(result, Err(Error::UpdateHandshakeFailed(_))));
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn close_shuts_session_and_transport() {
        let mut mock = ScriptedTransport::new();
        script_open(&mut mock);
        script_close(&mut mock);

        let mut dac = dac_with(mock);
        dac.open_session().await.unwrap();
        dac.close().await.unwrap();
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn close_when_no_session_open() {
        let mock = ScriptedTransport::new();
        let mut dac = dac_with(mock);
        dac.close().await.unwrap();
    }
}
