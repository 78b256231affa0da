// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tracing::{Instrument, debug, error, info, info_span, trace};

use crate::{
    client::{
        command::{Command, CommandKind},
        common::io_with_timeout,
        connection::FrameReader,
        rx_worker,
        session::{Session, SessionState, WorkerFlags},
    },
    error::InitiatorError,
    models::{
        command::request::ScsiCommandRequestBuilder,
        common::{BasicHeaderSegment, HEADER_LEN, NO_TAG},
        data::request::ScsiDataOutBuilder,
        data_format::PduWithData,
        login::request::{LoginRequest, LoginRequestBuilder},
        logout::request::LogoutRequestBuilder,
        nop::request::{NopOutRequest, NopOutRequestBuilder},
        text::request::{TextRequest, TextRequestBuilder},
    },
    sg::{immediate_len, unsolicited_chunks},
};

/// Transmit worker of one session. Connects, starts the Rx worker, then
/// writes every queued command until cancelled. Hands the queue back so the
/// caller can fail whatever is still in it.
pub(crate) async fn run(
    sess: Arc<Session>,
    mut queue: mpsc::Receiver<Arc<Command>>,
    ready: oneshot::Sender<Result<()>>,
) -> mpsc::Receiver<Arc<Command>> {
    sess.tx_state.set(WorkerFlags::STARTED);

    if let Err(e) = connect(&sess).await {
        error!(addr = %sess.addr, "connect failed: {e:#}");
        sess.tx_state.set(WorkerFlags::ERROR);
        sess.tx_state.set(WorkerFlags::EXITING);
        let _ = ready.send(Err(e));
        return queue;
    }
    let _ = ready.send(Ok(()));

    let cancel = sess.tx_cancel.clone();
    loop {
        let cmd = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(cmd) => cmd,
                None => break,
            },
        };

        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(anyhow::anyhow!("cancelled while sending")),
            r = process(&sess, &cmd) => r,
        };
        if let Err(e) = res {
            if sess.state() != SessionState::Destroying {
                error!(tag = format_args!("0x{:08x}", cmd.tag()), kind = ?cmd.kind(), "send failed: {e:#}");
            }
            sess.abort(&cmd);
            break;
        }
    }

    sess.worker_exited(&sess.tx_state, "tx");
    queue
}

async fn connect(sess: &Arc<Session>) -> Result<()> {
    sess.set_state(SessionState::Connecting);
    let stream = io_with_timeout(
        "connect",
        TcpStream::connect(sess.addr.as_str()),
        sess.connect_timeout,
        &sess.tx_cancel,
    )
    .await
    .map_err(|e| InitiatorError::Transport(format!("{}: {e:#}", sess.addr)))?;
    stream.set_nodelay(true).context("set TCP_NODELAY")?;
    sess.set_state(SessionState::Connected);
    info!(addr = %sess.addr, "connected");

    let (rd, wr) = stream.into_split();
    sess.set_writer(wr).await;

    let (started_tx, started_rx) = oneshot::channel();
    let span = info_span!("rx", target = sess.target, isid = %hex::encode(sess.isid));
    let handle = tokio::spawn(
        rx_worker::run(sess.clone(), FrameReader::new(rd), started_tx).instrument(span),
    );
    sess.set_rx_handle(handle);
    started_rx.await.context("Rx worker exited before start")?;
    Ok(())
}

async fn process(sess: &Arc<Session>, cmd: &Arc<Command>) -> Result<()> {
    ensure!(
        cmd.target() == sess.target,
        "command for target {} reached the session of target {}",
        cmd.target(),
        sess.target
    );

    let unanswered = cmd.is_unanswered_nop();
    if !unanswered {
        sess.outstanding.push(cmd.clone());
    }
    cmd.reset_tx_done();

    match cmd.kind() {
        CommandKind::Login => send_login(sess, cmd).await?,
        CommandKind::Text => send_text(sess, cmd).await?,
        CommandKind::Scsi => send_scsi(sess, cmd).await?,
        CommandKind::Nop => send_nop(sess, cmd).await?,
        CommandKind::Logout => send_logout(sess, cmd).await?,
    }

    if unanswered {
        cmd.complete(0);
    } else {
        cmd.mark_tx_done();
    }
    Ok(())
}

async fn send_login(sess: &Session, cmd: &Arc<Command>) -> Result<()> {
    let tag = cmd.tag();
    let exp_stat_sn = sess.exp_stat_sn();
    let (header, body) = cmd.with_login(|a| -> Result<_> {
        let b = LoginRequestBuilder::new()
            .transit(a.transit)
            .cont(a.cont)
            .csg(a.csg)
            .nsg(a.nsg)
            .versions(0, 0)
            .isid(&a.isid)
            .tsih(a.tsih)
            .initiator_task_tag(tag)
            .connection_id(a.cid)
            .cmd_sn(a.cmd_sn)
            .exp_stat_sn(exp_stat_sn);
        let mut pdu = PduWithData::<LoginRequest>::from_header(&b.header)?;
        pdu.append_data(&a.text)?;
        pdu.build(0)
    })??;

    sess.tags.insert(tag, cmd.clone())?;
    trace!(tag, "Login Request");
    sess.send_pdu(&header, [body.as_slice()]).await
}

async fn send_text(sess: &Session, cmd: &Arc<Command>) -> Result<()> {
    let tag = cmd.tag();
    sess.tags.insert(tag, cmd.clone())?;
    let cmd_sn = sess.next_cmd_sn();
    let exp_stat_sn = sess.exp_stat_sn();
    let (header, body) = cmd.with_text(|a| -> Result<_> {
        let b = TextRequestBuilder::new()
            .immediate(false)
            .final_bit(a.final_bit)
            .cont(a.cont)
            .lun(a.lun)
            .initiator_task_tag(tag)
            .target_transfer_tag(a.transfer_tag)
            .cmd_sn(cmd_sn)
            .exp_stat_sn(exp_stat_sn);
        let mut pdu = PduWithData::<TextRequest>::from_header(&b.header)?;
        pdu.append_data(&a.text)?;
        pdu.build(0)
    })??;

    trace!(tag, cmd_sn, "Text Request");
    sess.send_pdu(&header, [body.as_slice()]).await
}

async fn send_nop(sess: &Session, cmd: &Arc<Command>) -> Result<()> {
    let tag = cmd.tag();
    if tag != NO_TAG {
        sess.tags.insert(tag, cmd.clone())?;
    }
    let cmd_sn = sess.cmd_sn();
    let exp_stat_sn = sess.exp_stat_sn();
    let (header, body) = cmd.with_nop(|a| -> Result<_> {
        let b = NopOutRequestBuilder::new()
            .immediate()
            .lun(a.lun)
            .initiator_task_tag(tag)
            .target_transfer_tag(NO_TAG)
            .cmd_sn(cmd_sn)
            .exp_stat_sn(exp_stat_sn);
        let mut pdu = PduWithData::<NopOutRequest>::from_header(&b.header)?;
        pdu.append_data(&a.data)?;
        pdu.build(0)
    })??;

    trace!(tag, "NOP-Out");
    sess.send_pdu(&header, [body.as_slice()]).await
}

async fn send_logout(sess: &Session, cmd: &Arc<Command>) -> Result<()> {
    let tag = cmd.tag();
    sess.tags.insert(tag, cmd.clone())?;
    let cmd_sn = sess.next_cmd_sn();
    let exp_stat_sn = sess.exp_stat_sn();
    let header = cmd.with_logout(|a| -> Result<[u8; HEADER_LEN]> {
        let b = LogoutRequestBuilder::new(a.reason)
            .immediate(false)
            .initiator_task_tag(tag)
            .connection_id(a.cid)
            .cmd_sn(cmd_sn)
            .exp_stat_sn(exp_stat_sn);
        let mut buf = [0u8; HEADER_LEN];
        b.header.to_bhs_bytes(&mut buf)?;
        Ok(buf)
    })??;

    trace!(tag, cmd_sn, "Logout Request");
    sess.send_pdu(&header, std::iter::empty()).await
}

/// Send a SCSI Command with its immediate data, then any unsolicited
/// Data-Out the negotiated burst rules allow. Solicited data is sent by the
/// Rx worker when the R2Ts arrive.
async fn send_scsi(sess: &Session, cmd: &Arc<Command>) -> Result<()> {
    let p = sess.snapshot();
    let tag = cmd.tag();
    let cmd_sn = sess.cmd_sn();
    let exp_stat_sn = sess.exp_stat_sn();

    let plan = cmd.with_scsi(|a| -> Result<_> {
        let trans_len = a.trans_len as usize;
        if p.max_burst_length != 0 && trans_len > p.max_burst_length {
            bail!(
                "transfer of {trans_len} bytes exceeds MaxBurstLength {}",
                p.max_burst_length
            );
        }
        ensure!(
            a.length <= a.trans_len,
            "immediate length {} exceeds transfer length {}",
            a.length,
            a.trans_len
        );
        ensure!(a.ahs.len() % 4 == 0, "AHS length {} is not a multiple of 4", a.ahs.len());
        ensure!(a.ahs.len() <= 255 * 4, "AHS of {} bytes does not fit", a.ahs.len());
        if a.output {
            ensure!(
                a.send_data.total_len() >= trans_len,
                "send buffer of {} bytes is shorter than transfer length {trans_len}",
                a.send_data.total_len()
            );
        }
        a.status = 0;
        a.bytes_sent = 0;
        a.bytes_recv = 0;
        a.residual = 0;
        a.sense = None;

        let imm = if a.output {
            immediate_len(
                trans_len,
                p.immediate_data,
                p.max_recv_data_segment_length,
                p.first_burst_length,
            )
        } else {
            0
        };
        let unsolicited = if a.output && !p.initial_r2t && imm < trans_len {
            unsolicited_chunks(
                trans_len,
                imm,
                p.first_burst_length,
                p.max_recv_data_segment_length,
            )?
        } else {
            Vec::new()
        };
        let final_bit = if !a.output {
            true
        } else if p.immediate_data {
            imm == trans_len
        } else {
            unsolicited.is_empty()
        };
        a.length = imm as u32;

        let mut b = ScsiCommandRequestBuilder::new()
            .immediate(false)
            .final_bit(final_bit)
            .read(a.input)
            .write(a.output)
            .task_attribute(a.attr)
            .initiator_task_tag(tag)
            .expected_data_transfer_length(a.trans_len)
            .cmd_sn(cmd_sn)
            .exp_stat_sn(exp_stat_sn)
            .lun(a.lun)
            .scsi_descriptor_block(&a.cdb);
        b.header.set_data_length_bytes(imm as u32);
        b.header.set_ahs_length_bytes(a.ahs.len() as u8);
        let mut header = [0u8; HEADER_LEN];
        b.header.to_bhs_bytes(&mut header)?;

        Ok((
            header,
            std::mem::take(&mut a.ahs),
            std::mem::take(&mut a.send_data),
            imm,
            unsolicited,
            a.lun,
        ))
    })??;
    let (header, ahs, send_data, imm, unsolicited, lun) = plan;

    sess.tags.insert(tag, cmd.clone())?;

    let res: Result<usize> = async {
        let mut sent = 0usize;
        let window = send_data.window(0, imm)?;
        trace!(tag, cmd_sn, imm, "SCSI Command");
        sess.send_pdu(&header, std::iter::once(ahs.as_slice()).chain(window.iter()))
            .await?;
        sent += imm;

        let last = unsolicited.len().saturating_sub(1);
        for (i, chunk) in unsolicited.iter().enumerate() {
            let b = ScsiDataOutBuilder::new()
                .final_bit(i == last)
                .lun(lun)
                .initiator_task_tag(tag)
                .target_transfer_tag(NO_TAG)
                .exp_stat_sn(sess.exp_stat_sn())
                .data_sn(i as u32)
                .buffer_offset(chunk.offset as u32)
                .data_segment_length(chunk.len as u32);
            let mut hdr = [0u8; HEADER_LEN];
            b.header.to_bhs_bytes(&mut hdr)?;
            let window = send_data.window(chunk.offset, chunk.len)?;
            trace!(tag, offset = chunk.offset, len = chunk.len, "unsolicited Data-Out");
            sess.send_pdu(&hdr, window.iter()).await?;
            sent += chunk.len;
        }
        Ok(sent)
    }
    .await;

    cmd.with_scsi(|a| {
        a.ahs = ahs;
        a.send_data = send_data;
        if let Ok(sent) = &res {
            a.bytes_sent = *sent as u32;
        }
    })?;
    let sent = res?;
    sess.next_cmd_sn();
    debug!(tag, sent, "SCSI Command sent");
    Ok(())
}
