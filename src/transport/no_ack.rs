use crate::{
    packet::{Message, Packet},
    seq::SeqNum,
};

use super::{Receiver, ReceiverEnv, Sender, SenderEnv};

/// Sends every message once, immediately, and never looks back.
#[derive(Debug, Default, derive_new::new)]
pub struct NoAckSender;

impl Sender for NoAckSender {
    fn from_application(&mut self, msg: &Message, env: &mut dyn SenderEnv) -> bool {
        let pkt = Packet::builder()
            .data(msg.data.clone())
            .is_end(msg.is_end)
            .seq_num(SeqNum::ZERO)
            .timestamp(env.now())
            .build();
        env.to_network(pkt);
        true
    }

    fn from_network(&mut self, _pkt: Packet, _env: &mut dyn SenderEnv) {}

    fn on_timeout(&mut self, _seq: SeqNum, _env: &mut dyn SenderEnv) {}

    fn outstanding(&self) -> usize {
        0
    }
}

/// Hands every arriving packet to the application.
#[derive(Debug, Default, derive_new::new)]
pub struct NoAckReceiver;

impl Receiver for NoAckReceiver {
    fn from_network(&mut self, pkt: Packet, env: &mut dyn ReceiverEnv) {
        env.to_application(pkt.to_message());
    }
}
