/// The fatal error taxonomy of the core.
///
/// None of these are recoverable: the whole value of an emulator is bit-exact
/// fidelity, so a wiring defect or exhausted fixed-capacity container must
/// surface immediately instead of letting the machine run on with corrupted
/// state. How a fatal error is reported to a human (print-and-exit, log and
/// abort) is left to the embedding platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum Error {
    /// A bus access landed in an address range no registered device claims.
    #[display("no device claims address 0x{addr:0>4X}")]
    UnmappedAddress { addr: u16 },
    /// A fixed-capacity container (bus table, event queue) is full.
    #[display("fixed-capacity container is full")]
    CapacityExceeded,
    /// `pop`/`front` was called on an empty queue.
    #[display("container is empty")]
    EmptyContainer,
    /// A decode path was reached with an out-of-range register or condition
    /// index. The instruction set is closed, so this indicates a bug in the
    /// dispatch tables.
    #[display("invalid operand code 0x{code:0>2X}")]
    InvalidOperand { code: u8 },
    /// A device was registered over an address range another device already
    /// claims. Aliased regions share storage, not ranges, so this is always a
    /// boot-wiring defect.
    #[display("device range 0x{start:0>4X}..=0x{end:0>4X} overlaps a registered device")]
    OverlappingRange { start: u16, end: u16 },
}

pub type Result<T> = std::result::Result<T, Error>;
