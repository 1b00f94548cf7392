// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Thin request/response layer modeling the control surface a real device
// node would expose through `ioctl` (see SPEC_FULL.md §6). Validates
// request sizes and buffer counts, then hands the already-typed arguments
// to `rendezvous`/`Device`/`Handle`. Does not bind to any real device file
// or ioctl number scheme — the out-of-scope piece is everything between an
// actual `open("/dev/...")`/`ioctl(2)` pair and this module's `dispatch`
// entry point.

use crate::device::{Device, Registry, VERSION};
use crate::error::{trace_err, IpcError, Result};
use crate::handle::Handle;
use crate::ids::{current_tid, Pid, Tid};
use crate::rendezvous::MsgDescriptor;

/// Upper bound on how many message buffers a single request may carry.
///
/// The reference driver has no such cap (a malicious or buggy caller could
/// ask for an unbounded `smsgs`/`rmsgs` array); this reimplementation
/// enforces one so `Request::validate` can reject a malformed request size
/// before any page is pinned, matching the dispatcher's documented
/// responsibility of "validates request sizes" ahead of the core call.
pub const MAX_MSGS_PER_REQUEST: usize = 256;

/// Mirrors the reference driver's `STPLR_*` ioctl command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Version,
    HandleGet,
    HandlePut,
    MsgSend,
    MsgSendReceive,
    MsgReceive,
    MsgReply,
}

/// One control-surface request, carrying exactly the fields the matching
/// `STPLR_*` ioctl's request structure does (see stplr.h).
#[derive(Debug)]
pub enum Request {
    Version,
    HandleGet { pid: Pid },
    HandlePut { handle: Handle },
    MsgSend {
        handle: Handle,
        dest_pid: Pid,
        dest_tid: Tid,
        smsgs: Vec<MsgDescriptor>,
    },
    MsgSendReceive {
        handle: Handle,
        dest_pid: Pid,
        dest_tid: Tid,
        smsgs: Vec<MsgDescriptor>,
        rmsgs: Vec<MsgDescriptor>,
    },
    MsgReceive {
        handle: Handle,
        rmsgs: Vec<MsgDescriptor>,
    },
    MsgReply {
        handle: Handle,
        dest_pid: Pid,
        dest_tid: Tid,
        rmsgs: Vec<MsgDescriptor>,
    },
}

impl Request {
    pub fn op(&self) -> Op {
        match self {
            Request::Version => Op::Version,
            Request::HandleGet { .. } => Op::HandleGet,
            Request::HandlePut { .. } => Op::HandlePut,
            Request::MsgSend { .. } => Op::MsgSend,
            Request::MsgSendReceive { .. } => Op::MsgSendReceive,
            Request::MsgReceive { .. } => Op::MsgReceive,
            Request::MsgReply { .. } => Op::MsgReply,
        }
    }

    /// Request-size validation the dispatcher performs before touching the
    /// core: every message array must be within `MAX_MSGS_PER_REQUEST`, and
    /// any `len > 0` descriptor must carry a non-null `addr`. This is the
    /// same shape of check a real dispatcher runs on the raw `ubuf`/`size`
    /// pair before it trusts the request enough to copy it in full.
    fn validate(&self) -> Result<()> {
        let check_msgs = |msgs: &[MsgDescriptor]| -> Result<()> {
            if msgs.len() > MAX_MSGS_PER_REQUEST {
                return Err(trace_err!(
                    IpcError::InvalidArgument,
                    "dispatch: {} messages exceeds MAX_MSGS_PER_REQUEST",
                    msgs.len()
                ));
            }
            if msgs.iter().any(|m| m.len > 0 && m.addr == 0) {
                return Err(trace_err!(
                    IpcError::InvalidArgument,
                    "dispatch: null address with nonzero length"
                ));
            }
            Ok(())
        };
        match self {
            Request::Version | Request::HandleGet { .. } | Request::HandlePut { .. } => Ok(()),
            Request::MsgSend { smsgs, .. } => check_msgs(smsgs),
            Request::MsgSendReceive { smsgs, rmsgs, .. } => {
                check_msgs(smsgs)?;
                check_msgs(rmsgs)
            }
            Request::MsgReceive { rmsgs, .. } => check_msgs(rmsgs),
            Request::MsgReply { rmsgs, .. } => check_msgs(rmsgs),
        }
    }
}

/// One control-surface response. Per-buffer `buflen` fields are updated
/// in place on the request's message vectors, mirroring the ioctl
/// contract's "responses are returned in-place" wording — callers read the
/// transferred lengths back out of the same `Vec<MsgDescriptor>` they
/// passed in.
#[derive(Debug)]
pub enum Response {
    Version { major: i32, minor: i32, micro: i32 },
    HandleGet { handle: Handle },
    HandlePut,
    MsgSend { smsgs: Vec<MsgDescriptor> },
    MsgSendReceive {
        smsgs: Vec<MsgDescriptor>,
        rmsgs: Vec<MsgDescriptor>,
    },
    MsgReceive {
        sender_pid: Pid,
        sender_tid: Tid,
        reply_required: bool,
        rmsgs: Vec<MsgDescriptor>,
    },
    MsgReply { rmsgs: Vec<MsgDescriptor> },
}

/// Validates `request`, then executes it against `device`. Mirrors
/// `stplr_ioctl`'s per-command dispatch table; an unrecognized op has no
/// representation in this enum (the match is exhaustive), so there is
/// nothing analogous to the reference driver's one-second anti-probing
/// sleep on an unknown command to reimplement — see DESIGN.md, Open
/// Question 5.
pub fn dispatch(device: &Device, request: Request) -> Result<Response> {
    request.validate()?;
    log::trace!("dispatch: {:?}", request.op());
    match request {
        Request::Version => {
            let (major, minor, micro) = VERSION;
            Ok(Response::Version { major, minor, micro })
        }
        Request::HandleGet { pid } => {
            let handle = Handle::acquire(device, pid)?;
            Ok(Response::HandleGet { handle })
        }
        Request::HandlePut { handle } => {
            handle.release(device)?;
            Ok(Response::HandlePut)
        }
        Request::MsgSend {
            handle,
            dest_pid,
            dest_tid,
            mut smsgs,
        } => {
            device.send(&handle, dest_pid, dest_tid, &mut smsgs)?;
            Ok(Response::MsgSend { smsgs })
        }
        Request::MsgSendReceive {
            handle,
            dest_pid,
            dest_tid,
            mut smsgs,
            mut rmsgs,
        } => {
            device.send_receive(&handle, dest_pid, dest_tid, &mut smsgs, &mut rmsgs)?;
            Ok(Response::MsgSendReceive { smsgs, rmsgs })
        }
        Request::MsgReceive { handle, mut rmsgs } => {
            let info = device.receive(&handle, &mut rmsgs)?;
            Ok(Response::MsgReceive {
                sender_pid: info.sender_pid,
                sender_tid: info.sender_tid,
                reply_required: info.reply_required,
                rmsgs,
            })
        }
        Request::MsgReply {
            handle,
            dest_pid,
            dest_tid,
            mut rmsgs,
        } => {
            device.reply(&handle, dest_pid, dest_tid, &mut rmsgs)?;
            Ok(Response::MsgReply { rmsgs })
        }
    }
}

/// Looks up the device named `device_name` in `registry` and dispatches
/// `request` against it, for a caller that addresses devices by name the
/// way opening `/dev/stplr0` would (SPEC_FULL.md §6, "device-node surface").
pub fn dispatch_named(registry: &Registry, device_name: &str, request: Request) -> Result<Response> {
    let device = registry.get(device_name)?;
    dispatch(&device, request)
}

/// Convenience constructor for a `HandleGet` request using the calling
/// thread's own OS identity as `pid`, mirroring how a real dispatcher
/// stamps the request header with the caller's credentials rather than
/// trusting a user-supplied `pid`.
pub fn handle_get_for_current_process() -> Request {
    Request::HandleGet {
        pid: crate::ids::current_pid(),
    }
}

/// Returns the current thread's id, for callers building a `Request` by
/// hand (e.g. to fill in a `dest_tid` obtained out of band).
pub fn current_thread_id() -> Tid {
    current_tid()
}
