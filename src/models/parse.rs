// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, anyhow, bail};
use enum_dispatch::enum_dispatch;
use zerocopy::FromBytes;

use crate::models::{
    async_msg::response::AsyncMessage,
    command::{request::ScsiCommandRequest, response::ScsiCommandResponse},
    common::{BasicHeaderSegment, HEADER_LEN, NO_TAG},
    data::{request::ScsiDataOut, response::ScsiDataIn},
    login::{request::LoginRequest, response::LoginResponse},
    logout::{request::LogoutRequest, response::LogoutResponse},
    nop::{request::NopOutRequest, response::NopInResponse},
    opcode::{BhsOpcode, Opcode},
    ready_2_transfer::response::ReadyToTransfer,
    reject::response::RejectPdu,
    text::{request::TextRequest, response::TextResponse},
};

/// One received Basic Header Segment, decoded by opcode.
#[enum_dispatch(BasicHeaderSegment)]
#[derive(Debug)]
pub enum InboundPdu {
    NopInResponse(NopInResponse),
    ScsiCommandResponse(ScsiCommandResponse),
    ScsiDataIn(ScsiDataIn),
    ReadyToTransfer(ReadyToTransfer),
    LoginResponse(LoginResponse),
    TextResponse(TextResponse),
    LogoutResponse(LogoutResponse),
    RejectPdu(RejectPdu),
    AsyncMessage(AsyncMessage),
}

fn read<T: FromBytes>(buf: &[u8; HEADER_LEN]) -> Result<T> {
    T::read_from_bytes(buf.as_slice())
        .map_err(|e| anyhow!("failed to decode {}: {e:?}", std::any::type_name::<T>()))
}

impl InboundPdu {
    /// Decode a target-to-initiator header. Initiator op-codes and op-codes
    /// this engine never drives are rejected.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        let bhs = BhsOpcode::try_from(buf[0])?;
        Ok(match bhs.opcode {
            Opcode::NopIn => Self::NopInResponse(read(buf)?),
            Opcode::ScsiCommandResp => Self::ScsiCommandResponse(read(buf)?),
            Opcode::ScsiDataIn => Self::ScsiDataIn(read(buf)?),
            Opcode::ReadyToTransfer => Self::ReadyToTransfer(read(buf)?),
            Opcode::LoginResp => Self::LoginResponse(read(buf)?),
            Opcode::TextResp => Self::TextResponse(read(buf)?),
            Opcode::LogoutResp => Self::LogoutResponse(read(buf)?),
            Opcode::Reject => Self::RejectPdu(read(buf)?),
            Opcode::AsyncMessage => Self::AsyncMessage(read(buf)?),
            other => bail!("unexpected opcode from target: {other:?}"),
        })
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Self::NopInResponse(_) => Opcode::NopIn,
            Self::ScsiCommandResponse(_) => Opcode::ScsiCommandResp,
            Self::ScsiDataIn(_) => Opcode::ScsiDataIn,
            Self::ReadyToTransfer(_) => Opcode::ReadyToTransfer,
            Self::LoginResponse(_) => Opcode::LoginResp,
            Self::TextResponse(_) => Opcode::TextResp,
            Self::LogoutResponse(_) => Opcode::LogoutResp,
            Self::RejectPdu(_) => Opcode::Reject,
            Self::AsyncMessage(_) => Opcode::AsyncMessage,
        }
    }

    #[inline]
    pub fn initiator_task_tag(&self) -> u32 {
        self.get_initiator_task_tag()
    }

    #[inline]
    pub fn data_length_bytes(&self) -> usize {
        self.get_data_length_bytes()
    }

    #[inline]
    pub fn ahs_length_bytes(&self) -> usize {
        self.get_ahs_length_bytes()
    }

    /// Tag usable for correlation, or `None` for Reject / Async Message and
    /// for the reserved `0xffffffff`.
    pub fn correlation_tag(&self) -> Option<u32> {
        if !self.opcode().carries_task_tag() {
            return None;
        }
        let tag = self.initiator_task_tag();
        (tag != NO_TAG).then_some(tag)
    }
}

/// One initiator-to-target header, decoded by opcode. Used to read the
/// offending header echoed back inside a Reject, and by test targets.
#[enum_dispatch(BasicHeaderSegment)]
#[derive(Debug)]
pub enum OutboundPdu {
    NopOutRequest(NopOutRequest),
    ScsiCommandRequest(ScsiCommandRequest),
    LoginRequest(LoginRequest),
    TextRequest(TextRequest),
    ScsiDataOut(ScsiDataOut),
    LogoutRequest(LogoutRequest),
}

impl OutboundPdu {
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        let bhs = BhsOpcode::try_from(buf[0])?;
        Ok(match bhs.opcode {
            Opcode::NopOut => Self::NopOutRequest(read(buf)?),
            Opcode::ScsiCommandReq => Self::ScsiCommandRequest(read(buf)?),
            Opcode::LoginReq => Self::LoginRequest(read(buf)?),
            Opcode::TextReq => Self::TextRequest(read(buf)?),
            Opcode::ScsiDataOut => Self::ScsiDataOut(read(buf)?),
            Opcode::LogoutReq => Self::LogoutRequest(read(buf)?),
            other => bail!("not an initiator opcode: {other:?}"),
        })
    }

    #[inline]
    pub fn initiator_task_tag(&self) -> u32 {
        self.get_initiator_task_tag()
    }

    #[inline]
    pub fn data_length_bytes(&self) -> usize {
        self.get_data_length_bytes()
    }
}
