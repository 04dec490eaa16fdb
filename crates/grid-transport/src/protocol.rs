//! The event wire protocol: single-event streaming via [`Protocol`] and
//! delta-compressed batch writes via [`MultiWriter`].
//!
//! Frame shape on the wire: one type byte, one count byte (max 255 events
//! per frame), then `count` events each serialized as an index byte
//! followed by `EventType::num_values()` value bytes.

use crate::error::TransportResult;
use crate::event::{ColorRemember, Event, EventType};
use crate::socket::Socket;

/// `MultiWriter` splits to a new frame once the current one holds this many
/// events (distinct from `Protocol`'s 255-event batch cap below).
const MULTIWRITER_FRAME_SPLIT: usize = 127;
/// `Protocol::add_event` flushes once the pending batch reaches this size.
const PROTOCOL_MAX_BATCH: usize = 255;

fn serialize_event(buf: &mut Vec<u8>, event: &Event) {
    buf.push(event.index);
    buf.extend_from_slice(&event.value[..event.event_type.num_values()]);
}

fn read_event(socket: &mut Socket, event_type: EventType) -> TransportResult<Event> {
    let mut index = [0u8; 1];
    socket.read(&mut index, true)?;
    let mut value = [0u8; 4];
    socket.read(&mut value[..event_type.num_values()], true)?;
    Ok(Event { event_type, index: index[0], value })
}

/// Batches events by type into frames, splitting a frame once it reaches
/// 255 events, and drops color writes that didn't change anything.
pub struct MultiWriter {
    touch_frames: Vec<Vec<u8>>,
    color_frames: Vec<Vec<u8>>,
    color_remember: ColorRemember,
}

impl MultiWriter {
    pub fn new() -> Self {
        MultiWriter { touch_frames: Vec::new(), color_frames: Vec::new(), color_remember: ColorRemember::new() }
    }

    fn frames_mut(&mut self, event_type: EventType) -> &mut Vec<Vec<u8>> {
        match event_type {
            EventType::GridTouch => &mut self.touch_frames,
            EventType::GridColor => &mut self.color_frames,
        }
    }

    pub fn write(&mut self, event: &Event) {
        if !event.remember(&mut self.color_remember) {
            return;
        }

        let event_type = event.event_type;
        let frames = self.frames_mut(event_type);

        let needs_new_frame = match frames.last() {
            Some(frame) => frame.len() > 2 && frame[1] as usize == MULTIWRITER_FRAME_SPLIT,
            None => true,
        };
        if needs_new_frame {
            frames.push(vec![event_type as u8, 0]);
        }

        let frame = frames.last_mut().unwrap();
        frame[1] += 1;
        serialize_event(frame, event);
    }

    /// Every non-empty frame, in type order (touches then colors).
    pub fn frames(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.touch_frames.iter().chain(self.color_frames.iter()).filter(|f| !f.is_empty())
    }

    pub fn clear(&mut self) {
        self.touch_frames.clear();
        self.color_frames.clear();
    }
}

impl Default for MultiWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected transport: single-event send/receive plus batch frame
/// delivery for [`MultiWriter`].
pub struct Protocol {
    socket: Socket,
    to_send: Vec<Event>,
    color_remember: ColorRemember,
}

impl Protocol {
    pub fn new(socket: Socket) -> Self {
        Protocol { socket, to_send: Vec::new(), color_remember: ColorRemember::new() }
    }

    pub fn connect(host: &str, port: u16) -> TransportResult<Self> {
        Ok(Protocol::new(Socket::connect(host, port)?))
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_open()
    }

    pub fn handshake(&mut self, client_id: u8) -> TransportResult<()> {
        self.socket.write(&[client_id]);
        self.socket.flush()
    }

    /// Non-blocking poll for a batch of incoming events; returns an empty
    /// vec if none are immediately available.
    pub fn get_events(&mut self) -> TransportResult<Vec<Event>> {
        let mut type_byte = [0u8; 1];
        if self.socket.read(&mut type_byte, false)? == 0 {
            return Ok(Vec::new());
        }

        let event_type = EventType::from_wire(type_byte[0])?;
        let mut count_byte = [0u8; 1];
        self.socket.read(&mut count_byte, true)?;

        let mut events = Vec::with_capacity(count_byte[0] as usize);
        for _ in 0..count_byte[0] {
            events.push(read_event(&mut self.socket, event_type)?);
        }
        Ok(events)
    }

    pub fn add_event(&mut self, event: Event) -> TransportResult<()> {
        if !event.remember(&mut self.color_remember) {
            return Ok(());
        }

        if let Some(first) = self.to_send.first() {
            if first.event_type != event.event_type {
                self.send_events()?;
            }
        }

        self.to_send.push(event);
        if self.to_send.len() == PROTOCOL_MAX_BATCH {
            self.send_events()?;
        }
        Ok(())
    }

    pub fn send_events(&mut self) -> TransportResult<()> {
        if self.to_send.is_empty() {
            return Ok(());
        }

        let event_type = self.to_send[0].event_type;
        self.socket.write(&[event_type as u8]);
        self.socket.write(&[self.to_send.len() as u8]);

        let mut buf = Vec::new();
        for event in &self.to_send {
            serialize_event(&mut buf, event);
        }
        self.socket.write(&buf);

        self.socket.flush()?;
        self.to_send.clear();
        Ok(())
    }

    pub fn send_writer(&mut self, writer: &mut MultiWriter) -> TransportResult<()> {
        for frame in writer.frames() {
            self.socket.write(frame);
        }
        self.socket.flush()?;
        writer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_writer_splits_a_frame_at_127_events() {
        let mut writer = MultiWriter::new();
        for i in 0..150u32 {
            writer.write(&Event::touch((i % 20) as u8, (i / 20 % 8) as u8, 100));
        }
        let frames: Vec<_> = writer.frames().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][1], 127);
        assert_eq!(frames[1][1], 23);
    }

    #[test]
    fn multi_writer_drops_unchanged_color_writes() {
        let mut writer = MultiWriter::new();
        writer.write(&Event::color(0, 0, 1, 2, 3));
        writer.write(&Event::color(0, 0, 1, 2, 3));
        let frames: Vec<_> = writer.frames().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][1], 1);
    }
}
