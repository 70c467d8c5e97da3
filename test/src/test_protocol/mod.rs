use wraith_shared::{
    BitReader, BitWrite, ClassId, Event, EventGuarantee, Replicate, Serde, SerdeErr,
    SignedVariableInteger, StateMask, StringPacker, StringUnpacker,
};

/// Events exchanged by the test peers, one per delivery guarantee.
#[derive(Clone, Debug, PartialEq)]
pub enum TestEvent {
    Chat(String),
    Score(i32),
    Position { x: i16, y: i16 },
}

impl Event for TestEvent {
    fn guarantee(&self) -> EventGuarantee {
        match self {
            TestEvent::Chat(_) => EventGuarantee::GuaranteedOrdered,
            TestEvent::Score(_) => EventGuarantee::Guaranteed,
            TestEvent::Position { .. } => EventGuarantee::Unguaranteed,
        }
    }

    fn pack(&self, strings: &mut StringPacker, writer: &mut dyn BitWrite) {
        match self {
            TestEvent::Chat(text) => {
                writer.write_bits(0, 2);
                strings.pack_string(text, writer);
            }
            TestEvent::Score(score) => {
                writer.write_bits(1, 2);
                SignedVariableInteger::<7>::new(*score).ser(writer);
            }
            TestEvent::Position { x, y } => {
                writer.write_bits(2, 2);
                x.ser(writer);
                y.ser(writer);
            }
        }
    }

    fn unpack(strings: &StringUnpacker, reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match reader.read_bits(2)? {
            0 => Ok(TestEvent::Chat(strings.unpack_string(reader)?)),
            1 => {
                let score = SignedVariableInteger::<7>::de(reader)?.get();
                Ok(TestEvent::Score(i32::try_from(score).map_err(|_| SerdeErr)?))
            }
            2 => Ok(TestEvent::Position {
                x: i16::de(reader)?,
                y: i16::de(reader)?,
            }),
            _ => Err(SerdeErr),
        }
    }
}

pub const X_MASK: StateMask = 1 << 0;
pub const Y_MASK: StateMask = 1 << 1;
pub const NAME_MASK: StateMask = 1 << 2;

const TEST_OBJECT_CLASS: ClassId = 1;

/// A replicated object with three independently sent parts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TestObject {
    pub x: i32,
    pub y: i32,
    pub name: String,
}

impl TestObject {
    pub fn new(x: i32, y: i32, name: &str) -> Self {
        Self {
            x,
            y,
            name: name.to_string(),
        }
    }
}

impl Replicate for TestObject {
    fn class_id(&self) -> ClassId {
        TEST_OBJECT_CLASS
    }

    fn create(class_id: ClassId) -> Option<Self> {
        (class_id == TEST_OBJECT_CLASS).then(TestObject::default)
    }

    fn pack_update(
        &self,
        mask: StateMask,
        strings: &mut StringPacker,
        writer: &mut dyn BitWrite,
    ) -> StateMask {
        let send_x = mask & X_MASK != 0;
        send_x.ser(writer);
        if send_x {
            SignedVariableInteger::<11>::new(self.x).ser(writer);
        }

        let send_y = mask & Y_MASK != 0;
        send_y.ser(writer);
        if send_y {
            SignedVariableInteger::<11>::new(self.y).ser(writer);
        }

        let send_name = mask & NAME_MASK != 0;
        send_name.ser(writer);
        if send_name {
            strings.pack_string(&self.name, writer);
        }

        0
    }

    fn unpack_update(
        &mut self,
        strings: &StringUnpacker,
        reader: &mut BitReader,
    ) -> Result<StateMask, SerdeErr> {
        let mut changed = 0;

        if bool::de(reader)? {
            self.x = read_coordinate(reader)?;
            changed |= X_MASK;
        }
        if bool::de(reader)? {
            self.y = read_coordinate(reader)?;
            changed |= Y_MASK;
        }
        if bool::de(reader)? {
            self.name = strings.unpack_string(reader)?;
            changed |= NAME_MASK;
        }

        Ok(changed)
    }
}

fn read_coordinate(reader: &mut BitReader) -> Result<i32, SerdeErr> {
    let value = SignedVariableInteger::<11>::de(reader)?.get();
    i32::try_from(value).map_err(|_| SerdeErr)
}

/// Replicated class names, in class id order.
pub fn class_names() -> [&'static str; 1] {
    ["TestObject"]
}
