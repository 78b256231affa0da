// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail, ensure};
use tokio::{net::tcp::OwnedReadHalf, sync::oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::{
    client::{
        command::{Command, CommandKind},
        connection::FrameReader,
        session::{Session, SessionState, WorkerFlags},
    },
    models::{
        async_msg::response::{AsyncEvent, AsyncMessage},
        command::{
            common::ScsiCommandResponseFlags, response::ScsiCommandResponse, sense::Sense,
        },
        common::{BasicHeaderSegment, HEADER_LEN, NO_TAG},
        data::{request::ScsiDataOutBuilder, response::ScsiDataIn},
        data_format::PduWithData,
        login::{common::Stage, response::LoginResponse},
        logout::{
            common::LogoutReason, request::LogoutRequestBuilder, response::LogoutResponse,
        },
        nop::{
            request::{NopOutRequest, NopOutRequestBuilder},
            response::NopInResponse,
        },
        parse::{InboundPdu, OutboundPdu},
        ready_2_transfer::response::ReadyToTransfer,
        reject::response::RejectPdu,
        text::response::TextResponse,
    },
    params::params_out,
    sg::r2t_chunks,
    utils::text_for_log,
};

/// Largest text segment accepted in a Login Response.
const MAX_LOGIN_TEXT: usize = 8192;

/// Receive worker of one session. Reads PDUs until cancelled or until the
/// connection fails; a command caught mid-dispatch is failed on the way out.
pub(crate) async fn run(
    sess: Arc<Session>,
    reader: FrameReader<OwnedReadHalf>,
    started: oneshot::Sender<()>,
) {
    sess.rx_state.set(WorkerFlags::STARTED);
    let _ = started.send(());

    let cancel = sess.rx_cancel.clone();
    let mut rx = Receiver {
        sess: sess.clone(),
        reader,
        current: None,
    };
    let res = tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(()),
        r = rx.run_loop() => r,
    };

    if let Some(cmd) = rx.current.take() {
        sess.abort(&cmd);
    }
    if let Err(e) = res
        && sess.state() != SessionState::Destroying
    {
        error!("receive failed: {e:#}");
    }
    sess.worker_exited(&sess.rx_state, "rx");
}

struct Receiver {
    sess: Arc<Session>,
    reader: FrameReader<OwnedReadHalf>,
    /// Command being dispatched; failed if the worker stops midway.
    current: Option<Arc<Command>>,
}

fn need(cmd: Option<Arc<Command>>, what: &str) -> Result<Arc<Command>> {
    cmd.ok_or_else(|| anyhow!("{what} with no matching command"))
}

impl Receiver {
    async fn run_loop(&mut self) -> Result<()> {
        loop {
            let raw = self.reader.read_header().await?;
            if self.sess.state() == SessionState::Destroying {
                debug!("session is being destroyed, stop reading");
                return Ok(());
            }
            let pdu = InboundPdu::decode(&raw)?;
            let ahs = pdu.ahs_length_bytes();
            if ahs > 0 {
                self.reader.skip(ahs).await?;
            }
            trace!(opcode = ?pdu.opcode(), tag = format_args!("0x{:08x}", pdu.initiator_task_tag()), "received");

            let cmd = match pdu.correlation_tag() {
                Some(tag) => match self.sess.tags.remove(tag) {
                    Some(cmd) => {
                        cmd.wait_tx_done().await;
                        self.sess.outstanding.remove(&cmd);
                        if cmd.is_completed() {
                            debug!(tag = format_args!("0x{tag:08x}"), "command already finished, discarding PDU");
                            self.skip_unclaimed(&pdu).await?;
                            continue;
                        }
                        Some(cmd)
                    },
                    None => {
                        warn!(
                            opcode = ?pdu.opcode(),
                            tag = format_args!("0x{tag:08x}"),
                            "no command for tag, discarding PDU"
                        );
                        self.skip_unclaimed(&pdu).await?;
                        continue;
                    },
                },
                None => None,
            };

            self.current = cmd.clone();
            self.dispatch(pdu, cmd).await?;
            self.current = None;
        }
    }

    async fn dispatch(&mut self, pdu: InboundPdu, cmd: Option<Arc<Command>>) -> Result<()> {
        match pdu {
            InboundPdu::NopInResponse(h) => self.nop_in(&h, cmd).await,
            InboundPdu::ScsiCommandResponse(h) => {
                self.scsi_response(&h, need(cmd, "SCSI Response")?).await
            },
            InboundPdu::ScsiDataIn(h) => self.scsi_read_data(&h, need(cmd, "Data-In")?).await,
            InboundPdu::ReadyToTransfer(h) => self.r2t(&h, need(cmd, "R2T")?).await,
            InboundPdu::LoginResponse(h) => {
                self.login_response(&h, need(cmd, "Login Response")?).await
            },
            InboundPdu::TextResponse(h) => {
                self.text_response(&h, need(cmd, "Text Response")?).await
            },
            InboundPdu::LogoutResponse(h) => {
                self.logout_response(&h, need(cmd, "Logout Response")?).await
            },
            InboundPdu::RejectPdu(h) => self.reject(&h).await,
            InboundPdu::AsyncMessage(h) => self.async_msg(&h).await,
        }
    }

    /// Put a command whose exchange continues back into the tag table and
    /// the outstanding list. A command aborted while it was off the table
    /// stays off it.
    fn rearm(&self, cmd: &Arc<Command>) -> Result<()> {
        if cmd.is_completed() {
            debug!(tag = format_args!("0x{:08x}", cmd.tag()), "aborted mid-exchange, not rearming");
            return Ok(());
        }
        self.sess.tags.insert(cmd.tag(), cmd.clone())?;
        self.sess.outstanding.push(cmd.clone());
        // abort may have run between the check and the insert
        if cmd.is_completed() {
            self.sess.tags.remove_if_same(cmd.tag(), cmd);
            self.sess.outstanding.remove(cmd);
        }
        Ok(())
    }

    /// Drop a PDU nobody waits for. Its status still counts towards
    /// ExpStatSN so later responses stay in sequence.
    async fn skip_unclaimed(&mut self, pdu: &InboundPdu) -> Result<()> {
        self.reader.discard(pdu.data_length_bytes()).await?;
        let stat_sn = match pdu {
            InboundPdu::ScsiCommandResponse(h) => Some(h.stat_sn.get()),
            InboundPdu::ScsiDataIn(h) if h.flags.s() => Some(h.stat_sn_or_rsvd.get()),
            _ => None,
        };
        if let Some(sn) = stat_sn
            && sn == self.sess.exp_stat_sn()
        {
            self.sess.set_exp_stat_sn(sn.wrapping_add(1));
        }
        Ok(())
    }

    fn check_mrdsl(&self, len: usize, what: &str) -> Result<()> {
        let mrdsl = self.sess.snapshot().max_recv_data_segment_length;
        ensure!(
            mrdsl == 0 || len <= mrdsl,
            "{what} data segment of {len} bytes exceeds MaxRecvDataSegmentLength {mrdsl}"
        );
        Ok(())
    }

    async fn nop_in(&mut self, h: &NopInResponse, cmd: Option<Arc<Command>>) -> Result<()> {
        let len = h.get_data_length_bytes();
        let data = self.reader.read_segment(len).await?;

        match &cmd {
            Some(cmd) => {
                let sent = cmd
                    .with_nop(|a| a.data.clone())
                    .context("NOP-In answered a command that is not a NOP-Out")?;
                if sent != data {
                    bail!(
                        "NOP-In echoed {} bytes that differ from the {} bytes sent",
                        data.len(),
                        sent.len()
                    );
                }
            },
            None if !h.wants_reply() && len != 0 => {
                bail!("unsolicited NOP-In without transfer tag carries {len} bytes");
            },
            None => {},
        }

        if h.wants_reply() {
            let b = NopOutRequestBuilder::new()
                .immediate()
                .lun(h.lun.get())
                .initiator_task_tag(NO_TAG)
                .target_transfer_tag(h.target_transfer_tag.get())
                .cmd_sn(self.sess.cmd_sn())
                .exp_stat_sn(self.sess.exp_stat_sn());
            let mut pdu = PduWithData::<NopOutRequest>::from_header(&b.header)?;
            pdu.append_data(&data)?;
            let (hdr, body) = pdu.build(0)?;
            debug!(ttt = h.target_transfer_tag.get(), "answering target ping");
            self.sess.send_pdu(&hdr, [body.as_slice()]).await?;
        }

        // A reply to our own ping acknowledges its StatSN; a target ping only
        // reports the current one.
        let stat_sn = h.stat_sn.get();
        let acked = if cmd.is_some() {
            stat_sn.wrapping_add(1)
        } else {
            stat_sn
        };
        self.sess.set_exp_stat_sn(acked);
        self.sess.set_cmd_sn(h.exp_cmd_sn.get());
        self.sess.set_max_cmd_sn(h.max_cmd_sn.get());

        if let Some(cmd) = cmd {
            cmd.complete(0);
        }
        Ok(())
    }

    async fn scsi_response(&mut self, h: &ScsiCommandResponse, cmd: Arc<Command>) -> Result<()> {
        let flags = h.flags();
        let tag = cmd.tag();
        ensure!(
            !flags.contains(ScsiCommandResponseFlags::O_SMALL),
            "tag 0x{tag:08x}: bidirectional read residual overflow"
        );
        ensure!(
            !flags.contains(ScsiCommandResponseFlags::U_SMALL),
            "tag 0x{tag:08x}: bidirectional read residual underflow"
        );
        ensure!(
            !flags.contains(ScsiCommandResponseFlags::O_BIG),
            "tag 0x{tag:08x}: residual overflow"
        );
        ensure!(h.response == 0, "tag 0x{tag:08x}: iSCSI response 0x{:02x}", h.response);
        ensure!(
            h.bidirectional_read_residual_count.get() == 0,
            "tag 0x{tag:08x}: bidirectional residual count {}",
            h.bidirectional_read_residual_count.get()
        );
        let stat_sn = h.stat_sn.get();
        ensure!(
            stat_sn == self.sess.exp_stat_sn(),
            "SCSI Response StatSN {stat_sn} != ExpStatSN {}",
            self.sess.exp_stat_sn()
        );
        self.sess.set_exp_stat_sn(stat_sn.wrapping_add(1));

        let len = h.get_data_length_bytes();
        self.check_mrdsl(len, "SCSI Response")?;
        let status = h.status;
        ensure!(
            status != 0 || len == 0,
            "tag 0x{tag:08x}: GOOD status with a {len}-byte data segment"
        );

        let sense = if len > 0 {
            let seg = self.reader.read_segment(len).await?;
            match Sense::from_segment(&seg) {
                Ok(s) => {
                    warn!(tag = format_args!("0x{tag:08x}"), status = ?h.scsi_status(), "sense: {s:?}");
                    Some(s)
                },
                Err(e) => {
                    warn!(tag = format_args!("0x{tag:08x}"), "undecodable sense data: {e:#}");
                    None
                },
            }
        } else {
            None
        };

        let residual = if flags.contains(ScsiCommandResponseFlags::U_BIG) {
            h.residual_count.get()
        } else {
            0
        };
        cmd.with_scsi(|a| -> Result<()> {
            if status == 0 && a.output {
                ensure!(
                    a.bytes_sent == a.trans_len,
                    "tag 0x{tag:08x}: sent {} of {} bytes",
                    a.bytes_sent,
                    a.trans_len
                );
                if a.input {
                    ensure!(
                        a.bytes_recv == a.bidi_trans_len,
                        "tag 0x{tag:08x}: received {} of {} bidirectional bytes",
                        a.bytes_recv,
                        a.bidi_trans_len
                    );
                }
            }
            a.status = status;
            a.residual = residual;
            a.sense = sense;
            Ok(())
        })??;

        self.sess.set_max_cmd_sn(h.max_cmd_sn.get());
        debug!(tag = format_args!("0x{tag:08x}"), status, "SCSI Response");
        cmd.complete(0);
        Ok(())
    }

    async fn scsi_read_data(&mut self, h: &ScsiDataIn, cmd: Arc<Command>) -> Result<()> {
        ensure!(cmd.kind() == CommandKind::Scsi, "Data-In for a {:?} command", cmd.kind());
        let tag = cmd.tag();
        ensure!(!h.flags.o(), "tag 0x{tag:08x}: Data-In residual overflow");
        if h.flags.u() {
            warn!(tag = format_args!("0x{tag:08x}"), residual = h.residual_count.get(), "Data-In residual underflow");
        } else {
            ensure!(
                h.residual_count.get() == 0,
                "tag 0x{tag:08x}: residual count {} without underflow",
                h.residual_count.get()
            );
        }
        let len = h.get_data_length_bytes();
        self.check_mrdsl(len, "Data-In")?;
        if h.exp_cmd_sn.get() != self.sess.cmd_sn() {
            warn!(
                exp_cmd_sn = h.exp_cmd_sn.get(),
                cmd_sn = self.sess.cmd_sn(),
                "Data-In ExpCmdSN does not match CmdSN"
            );
        }
        self.sess.set_max_cmd_sn(h.max_cmd_sn.get());

        let offset = h.buffer_offset.get() as usize;
        if len > 0 {
            let mut recv = cmd.with_scsi(|a| std::mem::take(&mut a.recv_data))?;
            let res: Result<()> = async {
                let mut window = recv.window_mut(offset, len)?;
                self.reader.read_into(&mut window).await
            }
            .await;
            cmd.with_scsi(|a| {
                a.recv_data = recv;
                if res.is_ok() {
                    a.bytes_recv += len as u32;
                }
            })?;
            res?;
        }
        trace!(tag = format_args!("0x{tag:08x}"), offset, len, "Data-In");

        if h.flags.s() {
            ensure!(h.flags.fin(), "tag 0x{tag:08x}: status on a non-final Data-In");
            let stat_sn = h.stat_sn_or_rsvd.get();
            ensure!(
                stat_sn == self.sess.exp_stat_sn(),
                "Data-In StatSN {stat_sn} != ExpStatSN {}",
                self.sess.exp_stat_sn()
            );
            self.sess.set_exp_stat_sn(stat_sn.wrapping_add(1));
            let residual = if h.flags.u() { h.residual_count.get() } else { 0 };
            cmd.with_scsi(|a| {
                a.status = h.status_or_rsvd;
                a.residual = residual;
            })?;
            debug!(tag = format_args!("0x{tag:08x}"), status = h.status_or_rsvd, "Data-In carried status");
            cmd.complete(0);
        } else {
            self.rearm(&cmd)?;
        }
        Ok(())
    }

    async fn r2t(&mut self, h: &ReadyToTransfer, cmd: Arc<Command>) -> Result<()> {
        ensure!(cmd.kind() == CommandKind::Scsi, "R2T for a {:?} command", cmd.kind());
        let desired = h.desired_data_transfer_length.get() as usize;
        ensure!(desired != 0, "R2T with zero desired length");
        let stat_sn = h.stat_sn.get();
        ensure!(
            stat_sn == self.sess.exp_stat_sn(),
            "R2T StatSN {stat_sn} != ExpStatSN {}",
            self.sess.exp_stat_sn()
        );
        ensure!(
            h.exp_cmd_sn.get() == self.sess.cmd_sn(),
            "R2T ExpCmdSN {} != CmdSN {}",
            h.exp_cmd_sn.get(),
            self.sess.cmd_sn()
        );
        self.sess.set_max_cmd_sn(h.max_cmd_sn.get());

        let len = h.get_data_length_bytes();
        if len > 0 {
            warn!(len, "R2T carries a data segment, skipping it");
            self.reader.discard(len).await?;
        }

        let offset = h.buffer_offset.get() as usize;
        let mrdsl = self.sess.snapshot().max_recv_data_segment_length;
        let chunks = r2t_chunks(offset, desired, mrdsl)?;
        let tag = h.initiator_task_tag.get();
        let ttt = h.target_transfer_tag.get();
        let (lun, send) =
            cmd.with_scsi(|a| (a.lun, std::mem::take(&mut a.send_data)))?;

        let res: Result<usize> = async {
            let last = chunks.len().saturating_sub(1);
            let mut sent = 0usize;
            for (i, c) in chunks.iter().enumerate() {
                let b = ScsiDataOutBuilder::new()
                    .final_bit(i == last)
                    .lun(lun)
                    .initiator_task_tag(tag)
                    .target_transfer_tag(ttt)
                    .exp_stat_sn(self.sess.exp_stat_sn())
                    .data_sn(i as u32)
                    .buffer_offset(c.offset as u32)
                    .data_segment_length(c.len as u32);
                let mut hdr = [0u8; HEADER_LEN];
                b.header.to_bhs_bytes(&mut hdr)?;
                let window = send.window(c.offset, c.len)?;
                self.sess.send_pdu(&hdr, window.iter()).await?;
                sent += c.len;
            }
            Ok(sent)
        }
        .await;

        cmd.with_scsi(|a| {
            a.send_data = send;
            if let Ok(n) = &res {
                a.bytes_sent += *n as u32;
            }
        })?;
        let sent = res?;
        debug!(tag = format_args!("0x{tag:08x}"), offset, sent, r2t_sn = h.r2t_sn.get(), "answered R2T");
        self.rearm(&cmd)
    }

    async fn login_response(&mut self, h: &LoginResponse, cmd: Arc<Command>) -> Result<()> {
        let len = h.get_data_length_bytes();
        if len > MAX_LOGIN_TEXT {
            cmd.complete(-1);
            bail!("Login Response text of {len} bytes exceeds {MAX_LOGIN_TEXT}");
        }
        let text_in = self.reader.read_segment(len).await?;
        debug!(text = %text_for_log(&text_in), "Login Response");

        match self.apply_login(h, &cmd, &text_in) {
            Ok(()) => {
                cmd.complete(0);
            },
            Err(e) => {
                error!("login round failed: {e:#}");
                cmd.complete(-1);
            },
        }
        Ok(())
    }

    fn apply_login(&self, h: &LoginResponse, cmd: &Arc<Command>, text_in: &[u8]) -> Result<()> {
        let sess = &self.sess;
        let creds = sess.creds();
        let mut params = sess.params();
        let out = if text_in.is_empty() {
            Vec::new()
        } else {
            params.parse(creds, text_in, false)?
        };
        if h.flags.transit() && !out.is_empty() {
            warn!(text = %text_for_log(&out), "target moved on while we still have keys to send");
        }

        let status = h.status();
        ensure!(status.is_success(), "target refused login: {}", status.describe());
        sess.set_exp_stat_sn(h.stat_sn.get().wrapping_add(1));

        cmd.with_login(|a| -> Result<()> {
            if !h.flags.transit() {
                if out.is_empty() {
                    a.text.clear();
                } else {
                    params.parse(creds, &out, true)?;
                    if out.starts_with(b"CHAP_N=") {
                        a.nsg = Stage::Operational;
                        a.transit = true;
                    }
                    a.text = out;
                }
                return Ok(());
            }

            match h.flags.nsg() {
                Some(Stage::Operational) => {
                    a.csg = a.nsg;
                    a.nsg = Stage::FullFeature;
                    a.text = params_out(&mut params, creds, None, "", false)?;
                    Ok(())
                },
                Some(Stage::FullFeature) => {
                    let tsih = h.tsih.get();
                    ensure!(tsih != 0, "target assigned TSIH 0");
                    ensure!(h.isid == a.isid, "ISID changed during login");
                    let exp_cmd_sn = h.exp_cmd_sn.get();
                    let max_cmd_sn = h.max_cmd_sn.get();
                    ensure!(
                        exp_cmd_sn == a.cmd_sn,
                        "ExpCmdSN {exp_cmd_sn} != login CmdSN {}",
                        a.cmd_sn
                    );
                    ensure!(
                        exp_cmd_sn <= max_cmd_sn,
                        "ExpCmdSN {exp_cmd_sn} > MaxCmdSN {max_cmd_sn}"
                    );
                    sess.set_cmd_sn(exp_cmd_sn);
                    sess.set_max_cmd_sn(max_cmd_sn);
                    sess.set_tsih(tsih);
                    a.tsih = tsih;
                    a.text.clear();

                    match params.value("SessionType") {
                        Some("Normal") => sess.set_state(SessionState::LoggedInNormal),
                        Some("Discovery") => sess.set_state(SessionState::LoggedInDiscovery),
                        other => bail!("unknown SessionType {other:?}"),
                    }
                    info!(tsih, state = %sess.state(), "logged in");
                    Ok(())
                },
                other => bail!("unexpected next stage {other:?}"),
            }
        })?
    }

    async fn text_response(&mut self, h: &TextResponse, cmd: Arc<Command>) -> Result<()> {
        let len = h.get_data_length_bytes();
        let text_in = self.reader.read_segment(len).await?;
        debug!(text = %text_for_log(&text_in), "Text Response");

        if let Err(e) = self.apply_text(h, &cmd, &text_in) {
            cmd.complete(-1);
            return Err(e);
        }
        cmd.complete(0);
        Ok(())
    }

    fn apply_text(&self, h: &TextResponse, cmd: &Arc<Command>, text_in: &[u8]) -> Result<()> {
        let sess = &self.sess;
        ensure!(
            h.target_transfer_tag.get() == NO_TAG,
            "Text Response with transfer tag 0x{:08x}",
            h.target_transfer_tag.get()
        );
        let stat_sn = h.stat_sn.get();
        ensure!(
            stat_sn == sess.exp_stat_sn(),
            "Text Response StatSN {stat_sn} != ExpStatSN {}",
            sess.exp_stat_sn()
        );
        ensure!(
            h.exp_cmd_sn.get() == sess.cmd_sn(),
            "Text Response ExpCmdSN {} != CmdSN {}",
            h.exp_cmd_sn.get(),
            sess.cmd_sn()
        );
        sess.set_exp_stat_sn(stat_sn.wrapping_add(1));
        sess.set_max_cmd_sn(h.max_cmd_sn.get());

        let fin = h.flags.fin();
        let creds = sess.creds();
        let mut params = sess.params();
        cmd.with_text(|a| -> Result<()> {
            if !text_in.is_empty() {
                params.reset("TargetName");
                params.reset("TargetAddress");
                let out = params.parse(creds, text_in, false)?;
                if out.is_empty() {
                    a.text.clear();
                } else {
                    ensure!(!fin, "target closed the exchange while we still have keys to send");
                    params.parse(creds, &out, true)?;
                    a.text = out;
                }
            }
            a.final_bit = fin;
            Ok(())
        })?
    }

    async fn logout_response(&mut self, h: &LogoutResponse, cmd: Arc<Command>) -> Result<()> {
        let len = h.get_data_length_bytes();
        if len > 0 {
            self.reader.discard(len).await?;
        }
        let sess = &self.sess;
        let res: Result<()> = (|| {
            ensure!(h.response == 0, "logout refused: {:?}", h.response_code());
            let stat_sn = h.stat_sn.get();
            ensure!(
                stat_sn == sess.exp_stat_sn(),
                "Logout Response StatSN {stat_sn} != ExpStatSN {}",
                sess.exp_stat_sn()
            );
            sess.set_exp_stat_sn(stat_sn.wrapping_add(1));
            ensure!(
                h.exp_cmd_sn.get() == sess.cmd_sn(),
                "Logout Response ExpCmdSN {} != CmdSN {}",
                h.exp_cmd_sn.get(),
                sess.cmd_sn()
            );
            sess.set_max_cmd_sn(h.max_cmd_sn.get());
            cmd.with_logout(|a| {
                a.response = h.response;
                a.time2wait = h.time2wait.get();
                a.time2retain = h.time2retain.get();
            })
        })();

        match res {
            Ok(()) => {
                cmd.complete(0);
            },
            Err(e) => {
                error!("logout failed: {e:#}");
                cmd.complete(-1);
            },
        }
        Ok(())
    }

    async fn reject(&mut self, h: &RejectPdu) -> Result<()> {
        let len = h.get_data_length_bytes();
        ensure!(len == HEADER_LEN, "Reject carries {len} bytes, expected the {HEADER_LEN}-byte header");
        let seg = self.reader.read_segment(len).await?;
        let mut bad = [0u8; HEADER_LEN];
        bad.copy_from_slice(&seg);

        let tag = match OutboundPdu::decode(&bad) {
            Ok(pdu) => pdu.initiator_task_tag(),
            Err(e) => {
                error!(reason = ?h.reason(), "target rejected a PDU we cannot decode: {e:#}");
                return Ok(());
            },
        };
        error!(reason = ?h.reason(), tag = format_args!("0x{tag:08x}"), "target rejected PDU");

        if tag == NO_TAG {
            return Ok(());
        }
        match self.sess.tags.remove(tag) {
            Some(cmd) => {
                cmd.wait_tx_done().await;
                self.sess.outstanding.remove(&cmd);
                cmd.complete(-1);
            },
            None => warn!(tag = format_args!("0x{tag:08x}"), "rejected PDU has no pending command"),
        }
        Ok(())
    }

    async fn async_msg(&mut self, h: &AsyncMessage) -> Result<()> {
        let sess = &self.sess;
        sess.set_cmd_sn(h.exp_cmd_sn.get());
        sess.set_max_cmd_sn(h.max_cmd_sn.get());
        sess.set_exp_stat_sn(h.stat_sn.get().wrapping_add(1));

        let len = h.get_data_length_bytes();
        if len > 0 {
            self.reader.discard(len).await?;
        }

        let event = h.event();
        info!(?event, "Async Message");
        match event {
            AsyncEvent::LogoutRequested | AsyncEvent::Renegotiate => {
                self.send_logout().await?;
                sess.close_writer().await;
                bail!("target requested logout ({event:?})");
            },
            AsyncEvent::ConnectionDrop | AsyncEvent::SessionDrop => {
                sess.close_writer().await;
                bail!("target is dropping the connection ({event:?})");
            },
            AsyncEvent::ScsiEvent | AsyncEvent::VendorSpecific | AsyncEvent::Other(_) => Ok(()),
        }
    }

    /// Logout sent from the receive side when the target asks for it. The
    /// answer is never read: the worker stops right after.
    async fn send_logout(&self) -> Result<()> {
        let sess = &self.sess;
        sess.set_state(SessionState::LoggingOut);
        let b = LogoutRequestBuilder::new(LogoutReason::CloseSession)
            .immediate(false)
            .initiator_task_tag(sess.next_tag())
            .connection_id(sess.cid)
            .cmd_sn(sess.next_cmd_sn())
            .exp_stat_sn(sess.exp_stat_sn());
        let mut hdr = [0u8; HEADER_LEN];
        b.header.to_bhs_bytes(&mut hdr)?;
        sess.send_pdu(&hdr, std::iter::empty()).await
    }
}
