// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Minimal same-process smoke demo: one thread acquires a handle and blocks
// in RECEIVE, a second sends it a message and waits for the reply, modeling
// the SEND_RECEIVE / RECEIVE / REPLY round trip end to end without any real
// device node or second process.
//
// Usage: demo_send_recv [message]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ipc_rendezvous::config::DeviceCount;
use ipc_rendezvous::device::Registry;
use ipc_rendezvous::ids::Pid;
use ipc_rendezvous::{Device, Handle, MsgDescriptor};

fn run_receiver(device: Arc<Device>, pid: Pid, tid_tx: std::sync::mpsc::Sender<ipc_rendezvous::ids::Tid>) {
    let handle = Handle::acquire(&device, pid).expect("acquire receiver handle");
    tid_tx.send(handle.tid()).expect("report receiver tid");

    let mut buf = [0u8; 256];
    let mut rmsgs = [MsgDescriptor::new(buf.as_mut_ptr() as usize, buf.len())];
    let info = device.receive(&handle, &mut rmsgs).expect("receive");
    let text = String::from_utf8_lossy(&buf[..rmsgs[0].len]).into_owned();
    println!("recv: {} bytes from {}: {text:?}", rmsgs[0].len, info.sender_pid);

    if info.reply_required {
        let reply = b"ack";
        let mut reply_msgs = [MsgDescriptor::new(reply.as_ptr() as usize, reply.len())];
        device
            .reply(&handle, info.sender_pid, info.sender_tid, &mut reply_msgs)
            .expect("reply");
        println!("reply: sent {} bytes", reply_msgs[0].len);
    }

    handle.release(&device).expect("release receiver handle");
}

fn main() {
    env_logger::init();

    let message = std::env::args().nth(1).unwrap_or_else(|| "hello".to_string());

    let registry = Registry::new(DeviceCount::new(1));
    let device = registry.get("rendezvous0").expect("device exists");

    let receiver_pid = Pid(1);
    let sender_pid = Pid(2);
    let (tid_tx, tid_rx) = std::sync::mpsc::channel();

    let recv_device = Arc::clone(&device);
    let receiver = thread::spawn(move || run_receiver(recv_device, receiver_pid, tid_tx));

    let receiver_tid = tid_rx.recv().expect("receiver tid");
    thread::sleep(Duration::from_millis(10));

    let handle = Handle::acquire(&device, sender_pid).expect("acquire sender handle");
    let mut smsgs = [MsgDescriptor::new(message.as_ptr() as usize, message.len())];
    let mut reply_buf = [0u8; 256];
    let mut rmsgs = [MsgDescriptor::new(reply_buf.as_mut_ptr() as usize, reply_buf.len())];
    device
        .send_receive(&handle, receiver_pid, receiver_tid, &mut smsgs, &mut rmsgs)
        .expect("send_receive");

    let reply_text = String::from_utf8_lossy(&reply_buf[..rmsgs[0].len]).into_owned();
    println!("send_receive: sent {:?}, got reply {reply_text:?}", message);

    handle.release(&device).expect("release sender handle");
    receiver.join().expect("receiver thread panicked");
}
