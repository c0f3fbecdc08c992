//! End-to-end tests: whole packets through the parser, the renderer, and
//! both in sequence.

use hex_literal::hex;
use psyc_rs::util::VecBuf;
use psyc_rs::{
    render, Event, Modifier, ModifierFlag, Oper, Packet, PacketFlag, ParseError, Parser,
    Mode,
};

/// Owned version of the parse events, with streamed values reassembled.
#[derive(Debug, PartialEq, Eq, Clone)]
enum Item {
    Routing(u8, Vec<u8>, Vec<u8>),
    Entity(u8, Vec<u8>, Vec<u8>, bool),
    Body(Vec<u8>, Vec<u8>),
    Content(Vec<u8>),
    Complete,
}

#[derive(Default)]
struct Collector {
    items: Vec<Item>,
    entity: Option<(u8, Vec<u8>, Vec<u8>)>,
    body: Option<(Vec<u8>, Vec<u8>)>,
    content: Option<Vec<u8>>,
}

impl Collector {
    /// Folds one event in; returns true once the packet is complete.
    fn on(&mut self, event: Event, length_known: bool) -> bool {
        match event {
            Event::Routing { oper, name, value } => {
                self.items
                    .push(Item::Routing(oper.byte(), name.to_vec(), value.to_vec()));
            }
            Event::Entity { oper, name, value } => {
                self.items.push(Item::Entity(
                    oper.byte(),
                    name.to_vec(),
                    value.to_vec(),
                    length_known,
                ));
            }
            Event::EntityStart { oper, name, value } => {
                self.entity = Some((oper.byte(), name.to_vec(), value.to_vec()));
            }
            Event::EntityCont { value } => {
                self.entity.as_mut().unwrap().2.extend_from_slice(value);
            }
            Event::EntityEnd { value } => {
                let (oper, name, mut acc) = self.entity.take().unwrap();
                acc.extend_from_slice(value);
                self.items.push(Item::Entity(oper, name, acc, true));
            }
            Event::Body { method, data } => {
                self.items.push(Item::Body(method.to_vec(), data.to_vec()));
            }
            Event::BodyStart { method, data } => {
                self.body = Some((method.to_vec(), data.to_vec()));
            }
            Event::BodyCont { data } => {
                self.body.as_mut().unwrap().1.extend_from_slice(data);
            }
            Event::BodyEnd { data } => {
                let (method, mut acc) = self.body.take().unwrap();
                acc.extend_from_slice(data);
                self.items.push(Item::Body(method, acc));
            }
            Event::Content { value } => {
                self.items.push(Item::Content(value.to_vec()));
            }
            Event::ContentStart { value } => {
                self.content = Some(value.to_vec());
            }
            Event::ContentCont { value } => {
                self.content.as_mut().unwrap().extend_from_slice(value);
            }
            Event::ContentEnd { value } => {
                let mut acc = self.content.take().unwrap();
                acc.extend_from_slice(value);
                self.items.push(Item::Content(acc));
            }
            Event::Complete => {
                self.items.push(Item::Complete);
                return true;
            }
            Event::Insufficient => unreachable!("insufficient is handled by the feed loop"),
        }
        false
    }
}

/// Parses one packet that is fully contained in `bytes`.
fn parse_whole(bytes: &[u8]) -> Vec<Item> {
    parse_split_with_mode(bytes, bytes.len(), Mode::Full)
}

/// Parses one packet, feeding `bytes[..split]` first and the carried-over
/// tail plus `bytes[split..]` second.
fn parse_split(bytes: &[u8], split: usize) -> Vec<Item> {
    parse_split_with_mode(bytes, split, Mode::Full)
}

fn parse_split_with_mode(bytes: &[u8], split: usize, mode: Mode) -> Vec<Item> {
    let mut collector = Collector::default();
    let mut parser = Parser::with_mode(mode).feed(&bytes[..split]);
    let mut done = false;
    loop {
        match parser.step().unwrap() {
            Event::Insufficient => break,
            event => {
                if collector.on(event, parser.value_length_known()) {
                    done = true;
                    break;
                }
            }
        }
    }
    if !done {
        let mut carry = parser.remaining_slice().to_vec();
        carry.extend_from_slice(&bytes[split..]);
        let mut parser = parser.feed(&carry);
        loop {
            match parser.step().unwrap() {
                Event::Insufficient => panic!("packet should be complete"),
                event => {
                    if collector.on(event, parser.value_length_known()) {
                        break;
                    }
                }
            }
        }
    }
    collector.items
}

#[test]
fn simple_packet() {
    let bytes = b":_source\tpsyc://example.org/~alice\n\n_notice_test\nHi there\n|\n";
    assert_eq!(
        parse_whole(bytes),
        [
            Item::Routing(b':', b"_source".to_vec(), b"psyc://example.org/~alice".to_vec()),
            Item::Body(b"_notice_test".to_vec(), b"Hi there".to_vec()),
            Item::Complete,
        ]
    );
}

#[test]
fn entity_modifier_opens_the_content() {
    let bytes = b"=_amount_coins 2\t42\n_notice_add\n|\n";
    assert_eq!(
        parse_whole(bytes),
        [
            Item::Entity(b'=', b"_amount_coins".to_vec(), b"42".to_vec(), true),
            Item::Body(b"_notice_add".to_vec(), b"".to_vec()),
            Item::Complete,
        ]
    );
}

#[test]
fn length_prefixed_packet() {
    // content length 15: "=_list 3\tx|y\n" plus "q\n"; the "|" inside the
    // modifier value is literal
    let bytes = b":_source\ta\n15\n=_list 3\tx|y\nq\n|\n";
    assert_eq!(
        parse_whole(bytes),
        [
            Item::Routing(b':', b"_source".to_vec(), b"a".to_vec()),
            Item::Entity(b'=', b"_list".to_vec(), b"x|y".to_vec(), true),
            Item::Body(b"q".to_vec(), b"".to_vec()),
            Item::Complete,
        ]
    );
}

#[test]
fn interrupted_routing_modifier_resumes_from_the_line_start() {
    let first = b":_source\tabc";
    let mut parser = Parser::new().feed(first);
    assert_eq!(parser.step(), Ok(Event::Insufficient));
    assert_eq!(parser.remaining_slice(), first);

    let mut carry = parser.remaining_slice().to_vec();
    carry.extend_from_slice(b"def\n\n_m\n|\n");
    let mut parser = parser.feed(&carry);
    assert_eq!(
        parser.step(),
        Ok(Event::Routing { oper: Oper::Set, name: b"_source", value: b"abcdef" })
    );
    assert_eq!(parser.step(), Ok(Event::Body { method: b"_m", data: b"" }));
    assert_eq!(parser.step(), Ok(Event::Complete));
}

#[test]
fn entity_value_streams_across_buffers() {
    let mut parser = Parser::new().feed(b"\n=_data 10\t0123");
    assert_eq!(
        parser.step(),
        Ok(Event::EntityStart { oper: Oper::Assign, name: b"_data", value: b"0123" })
    );
    assert_eq!(parser.step(), Ok(Event::Insufficient));
    // only the unconsumed rest has to be carried over
    assert_eq!(parser.remaining_len(), 0);

    let mut parser = parser.feed(b"456789\n_m\n|\n");
    assert_eq!(parser.step(), Ok(Event::EntityEnd { value: b"456789" }));
    assert_eq!(parser.value_length(), 10);
    assert!(parser.value_length_known());
    assert_eq!(parser.step(), Ok(Event::Body { method: b"_m", data: b"" }));
    assert_eq!(parser.step(), Ok(Event::Complete));
}

#[test]
fn body_data_streams_across_buffers() {
    let mut parser = Parser::new().feed(b":_s\tx\n10\n_m\nabc");
    assert_eq!(
        parser.step(),
        Ok(Event::Routing { oper: Oper::Set, name: b"_s", value: b"x" })
    );
    assert_eq!(
        parser.step(),
        Ok(Event::BodyStart { method: b"_m", data: b"abc" })
    );
    assert_eq!(parser.step(), Ok(Event::Insufficient));

    let mut parser = parser.feed(b"def\n|\n");
    assert_eq!(parser.step(), Ok(Event::BodyEnd { data: b"def" }));
    assert_eq!(parser.value_length(), 6);
    assert_eq!(parser.step(), Ok(Event::Complete));
}

#[test]
fn multiple_packets_in_one_buffer() {
    let bytes = b"|\n:_target\tx\n|\n";
    let mut parser = Parser::new().feed(bytes);
    assert_eq!(parser.step(), Ok(Event::Complete));
    assert_eq!(
        parser.step(),
        Ok(Event::Routing { oper: Oper::Set, name: b"_target", value: b"x" })
    );
    assert_eq!(parser.step(), Ok(Event::Complete));
    assert_eq!(parser.step(), Ok(Event::Insufficient));
    assert_eq!(parser.remaining_len(), 0);
}

#[test]
fn routing_only_yields_opaque_content() {
    let bytes = b":_source\tpsyc://example.org/~alice\n\n_notice_test\nHi there\n|\n";
    assert_eq!(
        parse_split_with_mode(bytes, bytes.len(), Mode::RoutingOnly),
        [
            Item::Routing(b':', b"_source".to_vec(), b"psyc://example.org/~alice".to_vec()),
            Item::Content(b"_notice_test\nHi there\n".to_vec()),
            Item::Complete,
        ]
    );
}

#[test]
fn routing_only_content_streams_with_known_length() {
    let mut parser = Parser::with_mode(Mode::RoutingOnly).feed(b":_s\tx\n16\n_notice");
    assert_eq!(
        parser.step(),
        Ok(Event::Routing { oper: Oper::Set, name: b"_s", value: b"x" })
    );
    assert_eq!(parser.step(), Ok(Event::ContentStart { value: b"_notice" }));
    assert_eq!(parser.step(), Ok(Event::Insufficient));

    let mut parser = parser.feed(b"_test\nab\n|\n");
    assert_eq!(parser.step(), Ok(Event::ContentEnd { value: b"_test\nab\n" }));
    assert_eq!(parser.step(), Ok(Event::Complete));
}

#[test]
fn content_only_buffers_hold_bare_contents() {
    let mut parser = Parser::with_mode(Mode::ContentOnly).feed(b"_notice_test\nHi there\n");
    assert_eq!(
        parser.step(),
        Ok(Event::Body { method: b"_notice_test", data: b"Hi there" })
    );
    assert_eq!(parser.step(), Ok(Event::Complete));
    assert_eq!(parser.step(), Ok(Event::Insufficient));

    // the next feed is the next content
    let mut parser = parser.feed(b"=_v 1\tx\n_m\n");
    assert_eq!(
        parser.step(),
        Ok(Event::Entity { oper: Oper::Assign, name: b"_v", value: b"x" })
    );
    assert_eq!(parser.step(), Ok(Event::Body { method: b"_m", data: b"" }));
    assert_eq!(parser.step(), Ok(Event::Complete));
}

#[test]
fn chunk_invariance() {
    let packets: [&[u8]; 3] = [
        b":_source\tpsyc://example.org/~alice\n=_color 3\tred\n_notice_test\nGreetings\n|\n",
        b":_s\tx\n10\n_m\nabcdef\n|\n",
        b"\n=_data 10\t0123456789\n_m\n|\n",
    ];
    for bytes in packets {
        let expected = parse_whole(bytes);
        for split in 0..=bytes.len() {
            assert_eq!(parse_split(bytes, split), expected, "split at {}", split);
        }
    }
}

#[test]
fn render_delimiter_data_roundtrip() {
    let routing = [Modifier::routing(Oper::Set, b"_source", b"x")];
    let packet = Packet::new(&routing, &[], b"_m", b"\n|\n", PacketFlag::Check);
    assert_eq!(packet.flag, PacketFlag::NeedLength);

    let bytes: VecBuf = render(&packet).unwrap();
    assert_eq!(bytes.len(), packet.length());
    assert_eq!(
        parse_whole(&bytes),
        [
            Item::Routing(b':', b"_source".to_vec(), b"x".to_vec()),
            Item::Body(b"_m".to_vec(), b"\n|\n".to_vec()),
            Item::Complete,
        ]
    );
}

#[test]
fn render_binary_data_roundtrip() {
    // contains the delimiter sequence 0a 7c 0a, so a length is required
    let payload = hex!("00 ff 1b 0a 7c 0a 17");
    let routing = [Modifier::routing(Oper::Set, b"_source", b"x")];
    let packet = Packet::new(&routing, &[], b"_binary", &payload, PacketFlag::Check);
    assert_eq!(packet.flag, PacketFlag::NeedLength);

    let bytes: VecBuf = render(&packet).unwrap();
    assert_eq!(
        parse_whole(&bytes),
        [
            Item::Routing(b':', b"_source".to_vec(), b"x".to_vec()),
            Item::Body(b"_binary".to_vec(), payload.to_vec()),
            Item::Complete,
        ]
    );
}

/// Parses a rendered packet, rebuilds it from the events and the reported
/// framing, renders it again and expects the identical bytes. This is the
/// echo-server loop.
fn assert_echo_identical(bytes: &[u8]) {
    let mut routing_raw = Vec::new();
    let mut entity_raw = Vec::new();
    let mut method = Vec::new();
    let mut data = Vec::new();
    let mut need_length = false;

    let mut parser = Parser::new().feed(bytes);
    loop {
        match parser.step().unwrap() {
            Event::Routing { oper, name, value } => {
                routing_raw.push((oper, name.to_vec(), value.to_vec()));
            }
            Event::Entity { oper, name, value } => {
                let flag = if parser.value_length_known() {
                    ModifierFlag::NeedLength
                } else {
                    ModifierFlag::NoLength
                };
                entity_raw.push((oper, name.to_vec(), value.to_vec(), flag));
            }
            Event::Body { method: m, data: d } => {
                method = m.to_vec();
                data = d.to_vec();
                need_length = parser.content_length_known();
            }
            Event::Complete => break,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    let routing: Vec<Modifier> = routing_raw
        .iter()
        .map(|(oper, name, value)| Modifier::routing(*oper, name, value))
        .collect();
    let entity: Vec<Modifier> = entity_raw
        .iter()
        .map(|(oper, name, value, flag)| Modifier::new(*oper, name, value, *flag))
        .collect();
    let flag = if need_length {
        PacketFlag::NeedLength
    } else {
        PacketFlag::NoLength
    };
    let packet = Packet::new(&routing, &entity, &method, &data, flag);
    let rendered: VecBuf = render(&packet).unwrap();
    assert_eq!(&rendered[..], bytes);
}

#[test]
fn echo_roundtrips_are_byte_identical() {
    let packets: [&[u8]; 4] = [
        b":_source\tpsyc://example.org/~alice\n\n_notice_test\nHi there\n|\n",
        b":_source\ta\n15\n=_list 3\tx|y\nq\n|\n",
        b"\n=_tag 0\t\n_m\n|\n",
        b":_target\tpsyc://example.org/\n|\n",
    ];
    for bytes in packets {
        assert_echo_identical(bytes);
    }
}

#[test]
fn routing_only_echo_is_byte_identical() {
    let bytes = b":_source\tpsyc://example.org/~alice\n\n_notice_test\nHi there\n|\n";

    let mut routing_raw = Vec::new();
    let mut content = Vec::new();
    let mut parser = Parser::with_mode(Mode::RoutingOnly).feed(bytes);
    loop {
        match parser.step().unwrap() {
            Event::Routing { oper, name, value } => {
                routing_raw.push((oper, name.to_vec(), value.to_vec()));
            }
            Event::Content { value } => content = value.to_vec(),
            Event::Complete => break,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    let routing: Vec<Modifier> = routing_raw
        .iter()
        .map(|(oper, name, value)| Modifier::routing(*oper, name, value))
        .collect();
    let packet = Packet::new_raw(&routing, &content, PacketFlag::NoLength);
    let rendered: VecBuf = render(&packet).unwrap();
    assert_eq!(&rendered[..], bytes);
}

#[test]
fn errors_are_terminal_for_the_current_packet_only() {
    let mut parser = Parser::new().feed(b":\tx\n|\n");
    assert_eq!(parser.step(), Err(ParseError::InvalidModifierName));

    // a freshly initialized state parses the next packet fine
    let mut parser = Parser::new().feed(b"|\n");
    assert_eq!(parser.step(), Ok(Event::Complete));
}
