// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Multi-threaded integration tests exercising the end-to-end rendezvous
// scenarios: real std::thread senders and receivers, synchronized only
// through the crate's own Device/Handle API (a plain mpsc channel is used
// only to hand a receiver's real OS tid to the thread that addresses it —
// the rendezvous itself has no backdoors into internal state).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ipc_rendezvous::config::DeviceCount;
use ipc_rendezvous::device::Registry;
use ipc_rendezvous::ids::Pid;
use ipc_rendezvous::{Device, Handle, IpcError, MsgDescriptor};

static NEXT_PID: AtomicU64 = AtomicU64::new(1000);

fn fresh_pid() -> Pid {
    Pid(NEXT_PID.fetch_add(1, Ordering::Relaxed))
}

fn device() -> Arc<Device> {
    let registry = Registry::new(DeviceCount::new(1));
    registry.get("rendezvous0").expect("device exists")
}

// Scenario 1: basic send — the receiver reads exactly the bytes the sender
// sent, and both sides publish buflen = 3.
#[test]
fn basic_send() {
    let device = device();
    let receiver_pid = fresh_pid();
    let sender_pid = fresh_pid();
    let (tid_tx, tid_rx) = mpsc::channel();

    let recv_device = Arc::clone(&device);
    let receiver = thread::spawn(move || {
        let handle = Handle::acquire(&recv_device, receiver_pid).expect("acquire receiver");
        tid_tx.send(handle.tid()).unwrap();

        let mut recv_buf = [0u8; 64];
        let mut rmsgs = [MsgDescriptor::new(recv_buf.as_mut_ptr() as usize, recv_buf.len())];
        let info = recv_device.receive(&handle, &mut rmsgs).expect("receive");

        assert_eq!(rmsgs[0].len, 3);
        assert_eq!(&recv_buf[..3], b"abc");
        assert_eq!(info.sender_pid, sender_pid);
        assert!(!info.reply_required);

        handle.release(&recv_device).unwrap();
    });

    let receiver_tid = tid_rx.recv().expect("receiver tid");
    // Give RECEIVE a moment to block; SEND is correct either way (it just
    // enqueues and waits), this only makes the "receiver unblocks first"
    // ordering in the scenario description the overwhelmingly likely one.
    thread::sleep(Duration::from_millis(20));

    let handle = Handle::acquire(&device, sender_pid).expect("acquire sender");
    let send_buf = *b"abc";
    let mut smsgs = [MsgDescriptor::new(send_buf.as_ptr() as usize, 3)];
    device
        .send(&handle, receiver_pid, receiver_tid, &mut smsgs)
        .expect("send");
    assert_eq!(smsgs[0].len, 3);

    handle.release(&device).unwrap();
    receiver.join().unwrap();
}

// Scenario 2: truncation — receiver's smaller buffer bounds the copy, and
// both sides report the truncated length.
#[test]
fn truncation_to_receiver_capacity() {
    let device = device();
    let receiver_pid = fresh_pid();
    let sender_pid = fresh_pid();
    let (tid_tx, tid_rx) = mpsc::channel();

    let recv_device = Arc::clone(&device);
    let receiver = thread::spawn(move || {
        let handle = Handle::acquire(&recv_device, receiver_pid).expect("acquire receiver");
        tid_tx.send(handle.tid()).unwrap();

        let mut recv_buf = [0u8; 10];
        let mut rmsgs = [MsgDescriptor::new(recv_buf.as_mut_ptr() as usize, recv_buf.len())];
        recv_device.receive(&handle, &mut rmsgs).expect("receive");
        assert_eq!(rmsgs[0].len, 10);

        handle.release(&recv_device).unwrap();
    });

    let receiver_tid = tid_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));

    let handle = Handle::acquire(&device, sender_pid).expect("acquire sender");
    let send_buf = [7u8; 100];
    let mut smsgs = [MsgDescriptor::new(send_buf.as_ptr() as usize, send_buf.len())];
    device
        .send(&handle, receiver_pid, receiver_tid, &mut smsgs)
        .expect("send");
    assert_eq!(smsgs[0].len, 10);

    handle.release(&device).unwrap();
    receiver.join().unwrap();
}

// Scenario 3: unequal buffer counts — excess entries on the longer side
// report zero.
#[test]
fn unequal_buffer_counts() {
    let device = device();
    let receiver_pid = fresh_pid();
    let sender_pid = fresh_pid();
    let (tid_tx, tid_rx) = mpsc::channel();

    let recv_device = Arc::clone(&device);
    let receiver = thread::spawn(move || {
        let handle = Handle::acquire(&recv_device, receiver_pid).expect("acquire receiver");
        tid_tx.send(handle.tid()).unwrap();

        let mut bufs = [[0u8; 4]; 2];
        let mut rmsgs = [
            MsgDescriptor::new(bufs[0].as_mut_ptr() as usize, 4),
            MsgDescriptor::new(bufs[1].as_mut_ptr() as usize, 4),
        ];
        recv_device.receive(&handle, &mut rmsgs).expect("receive");
        assert_eq!(rmsgs[0].len, 4);
        assert_eq!(rmsgs[1].len, 4);

        handle.release(&recv_device).unwrap();
    });

    let receiver_tid = tid_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));

    let handle = Handle::acquire(&device, sender_pid).expect("acquire sender");
    let bufs = [[1u8; 4]; 4];
    let mut smsgs: Vec<MsgDescriptor> = bufs
        .iter()
        .map(|b| MsgDescriptor::new(b.as_ptr() as usize, 4))
        .collect();
    device
        .send(&handle, receiver_pid, receiver_tid, &mut smsgs)
        .expect("send");

    assert_eq!(smsgs[0].len, 4);
    assert_eq!(smsgs[1].len, 4);
    assert_eq!(smsgs[2].len, 0);
    assert_eq!(smsgs[3].len, 0);

    handle.release(&device).unwrap();
    receiver.join().unwrap();
}

// Scenario 4: SEND_RECEIVE round trip — the sender's reply buffer ends up
// holding exactly what REPLY supplied.
#[test]
fn send_receive_round_trip() {
    let device = device();
    let receiver_pid = fresh_pid();
    let sender_pid = fresh_pid();
    let (tid_tx, tid_rx) = mpsc::channel();

    let recv_device = Arc::clone(&device);
    let receiver = thread::spawn(move || {
        let handle = Handle::acquire(&recv_device, receiver_pid).expect("acquire receiver");
        tid_tx.send(handle.tid()).unwrap();

        let mut recv_buf = [0u8; 16];
        let mut rmsgs = [MsgDescriptor::new(recv_buf.as_mut_ptr() as usize, recv_buf.len())];
        let info = recv_device.receive(&handle, &mut rmsgs).expect("receive");
        assert_eq!(&recv_buf[..4], b"ping");
        assert!(info.reply_required);

        let reply_buf = *b"pong";
        let mut reply_msgs = [MsgDescriptor::new(reply_buf.as_ptr() as usize, 4)];
        recv_device
            .reply(&handle, info.sender_pid, info.sender_tid, &mut reply_msgs)
            .expect("reply");
        assert_eq!(reply_msgs[0].len, 4);

        handle.release(&recv_device).unwrap();
    });

    let receiver_tid = tid_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));

    let handle = Handle::acquire(&device, sender_pid).expect("acquire sender");
    let send_buf = *b"ping";
    let mut smsgs = [MsgDescriptor::new(send_buf.as_ptr() as usize, 4)];
    let mut reply_buf = [0u8; 16];
    let mut rmsgs = [MsgDescriptor::new(reply_buf.as_mut_ptr() as usize, reply_buf.len())];
    device
        .send_receive(&handle, receiver_pid, receiver_tid, &mut smsgs, &mut rmsgs)
        .expect("send_receive");

    assert_eq!(rmsgs[0].len, 4);
    assert_eq!(&reply_buf[..4], b"pong");

    handle.release(&device).unwrap();
    receiver.join().unwrap();
}

// Scenario 5: cancellation mid-wait — SEND to a nonexistent receiver,
// cancelled while blocked, must return Interrupted, leave no trace on any
// queue, and release its pinned pages so a retry after the receiver
// appears succeeds cleanly.
#[test]
fn cancellation_mid_wait_then_retry_succeeds() {
    let device = device();
    let receiver_pid = fresh_pid();
    let sender_pid = fresh_pid();

    // The destination doesn't exist yet: SEND fails fast with NotFound,
    // before ever blocking. To exercise the *blocked* cancellation path we
    // first create the receiver's endpoint (so resolve_remote succeeds)
    // but never call RECEIVE on it, so the sender genuinely queues and
    // blocks until interrupted.
    let receiver_handle = Handle::acquire(&device, receiver_pid).expect("acquire receiver");
    let receiver_tid = receiver_handle.tid();

    let handle = Handle::acquire(&device, sender_pid).expect("acquire sender");
    let send_device = Arc::clone(&device);
    let sender = thread::spawn(move || {
        let send_buf = *b"abc";
        let mut smsgs = [MsgDescriptor::new(send_buf.as_ptr() as usize, 3)];
        send_device.send(&handle, receiver_pid, receiver_tid, &mut smsgs)
    });

    thread::sleep(Duration::from_millis(50));
    handle.interrupt(&device).expect("interrupt");
    let result = sender.join().unwrap();
    assert_eq!(result, Err(IpcError::Interrupted));

    // Retrying now that the receiver is actually listening must succeed.
    let recv_device = Arc::clone(&device);
    let receiver = thread::spawn(move || {
        let mut recv_buf = [0u8; 16];
        let mut rmsgs = [MsgDescriptor::new(recv_buf.as_mut_ptr() as usize, recv_buf.len())];
        recv_device.receive(&receiver_handle, &mut rmsgs).expect("receive");
        assert_eq!(rmsgs[0].len, 3);
        receiver_handle.release(&recv_device).unwrap();
    });

    thread::sleep(Duration::from_millis(20));
    let send_buf = *b"xyz";
    let mut smsgs = [MsgDescriptor::new(send_buf.as_ptr() as usize, 3)];
    device
        .send(&handle, receiver_pid, receiver_tid, &mut smsgs)
        .expect("retry send");
    assert_eq!(smsgs[0].len, 3);

    handle.release(&device).unwrap();
    receiver.join().unwrap();
}

// Scenario 6: zombie receiver — HANDLE_PUT racing ahead of a SEND means the
// strong-ref lookup of the destination must fail with NotFound and nothing
// gets pinned on the sender's side.
#[test]
fn send_to_released_handle_fails_not_found() {
    let device = device();
    let receiver_pid = fresh_pid();
    let sender_pid = fresh_pid();

    let receiver_handle = Handle::acquire(&device, receiver_pid).expect("acquire receiver");
    let receiver_tid = receiver_handle.tid();
    receiver_handle.release(&device).expect("release receiver");

    let handle = Handle::acquire(&device, sender_pid).expect("acquire sender");
    let send_buf = *b"abc";
    let mut smsgs = [MsgDescriptor::new(send_buf.as_ptr() as usize, 3)];
    let err = device
        .send(&handle, receiver_pid, receiver_tid, &mut smsgs)
        .unwrap_err();
    assert_eq!(err, IpcError::NotFound);
    // No partial success: buflen is untouched.
    assert_eq!(smsgs[0].len, 3);

    handle.release(&device).unwrap();
}

// Invariant: sender_queue is FIFO — of two senders queued on one receiver,
// RECEIVE always pairs with whichever enqueued first.
#[test]
fn sender_queue_is_fifo() {
    let device = device();
    let receiver_pid = fresh_pid();
    let (tid_tx, tid_rx) = mpsc::channel();

    let recv_device = Arc::clone(&device);
    let receiver = thread::spawn(move || {
        let handle = Handle::acquire(&recv_device, receiver_pid).expect("acquire receiver");
        tid_tx.send(handle.tid()).unwrap();

        let mut order = Vec::new();
        for _ in 0..2 {
            let mut recv_buf = [0u8; 8];
            let mut rmsgs = [MsgDescriptor::new(recv_buf.as_mut_ptr() as usize, recv_buf.len())];
            let info = recv_device.receive(&handle, &mut rmsgs).expect("receive");
            order.push(info.sender_pid);
        }
        handle.release(&recv_device).unwrap();
        order
    });

    let receiver_tid = tid_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));

    let first_pid = fresh_pid();
    let second_pid = fresh_pid();

    let d1 = Arc::clone(&device);
    let first = thread::spawn(move || {
        let handle = Handle::acquire(&d1, first_pid).expect("acquire first sender");
        let buf = *b"first";
        let mut smsgs = [MsgDescriptor::new(buf.as_ptr() as usize, buf.len())];
        d1.send(&handle, receiver_pid, receiver_tid, &mut smsgs).expect("send first");
        handle.release(&d1).unwrap();
    });
    // Ensure the first sender is queued before the second enqueues, so FIFO
    // order is deterministic rather than a race between the two sends.
    thread::sleep(Duration::from_millis(30));

    let d2 = Arc::clone(&device);
    let second = thread::spawn(move || {
        let handle = Handle::acquire(&d2, second_pid).expect("acquire second sender");
        let buf = *b"second";
        let mut smsgs = [MsgDescriptor::new(buf.as_ptr() as usize, buf.len())];
        d2.send(&handle, receiver_pid, receiver_tid, &mut smsgs).expect("send second");
        handle.release(&d2).unwrap();
    });

    first.join().unwrap();
    second.join().unwrap();
    let order = receiver.join().unwrap();
    assert_eq!(order, vec![first_pid, second_pid]);
}

// Boundary: a sender with zero messages paired with a receiver expecting
// some still completes, with all receiver lengths set to zero.
#[test]
fn zero_length_sender_zeroes_receiver_lengths() {
    let device = device();
    let receiver_pid = fresh_pid();
    let sender_pid = fresh_pid();
    let (tid_tx, tid_rx) = mpsc::channel();

    let recv_device = Arc::clone(&device);
    let receiver = thread::spawn(move || {
        let handle = Handle::acquire(&recv_device, receiver_pid).expect("acquire receiver");
        tid_tx.send(handle.tid()).unwrap();

        let mut recv_buf = [0xAAu8; 8];
        let mut rmsgs = [MsgDescriptor::new(recv_buf.as_mut_ptr() as usize, recv_buf.len())];
        recv_device.receive(&handle, &mut rmsgs).expect("receive");
        assert_eq!(rmsgs[0].len, 0);

        handle.release(&recv_device).unwrap();
    });

    let receiver_tid = tid_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));

    let handle = Handle::acquire(&device, sender_pid).expect("acquire sender");
    let mut smsgs: [MsgDescriptor; 0] = [];
    device
        .send(&handle, receiver_pid, receiver_tid, &mut smsgs)
        .expect("send");

    handle.release(&device).unwrap();
    receiver.join().unwrap();
}
