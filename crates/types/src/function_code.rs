use serde::{Deserialize, Serialize};

/// The four standard Modbus read function codes this scanner probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionCode {
    Coils,
    DiscreteInputs,
    HoldingRegisters,
    InputRegisters,
}

impl FunctionCode {
    pub const ALL: [FunctionCode; 4] = [
        FunctionCode::Coils,
        FunctionCode::DiscreteInputs,
        FunctionCode::HoldingRegisters,
        FunctionCode::InputRegisters,
    ];

    /// Protocol function code byte, per the Modbus spec.
    pub const fn code(self) -> u8 {
        match self {
            FunctionCode::Coils => 1,
            FunctionCode::DiscreteInputs => 2,
            FunctionCode::HoldingRegisters => 3,
            FunctionCode::InputRegisters => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(FunctionCode::Coils),
            2 => Some(FunctionCode::DiscreteInputs),
            3 => Some(FunctionCode::HoldingRegisters),
            4 => Some(FunctionCode::InputRegisters),
            _ => None,
        }
    }

    /// true for the bit-addressed FCs (1/2), false for the 16-bit register FCs (3/4).
    pub const fn is_bit_type(self) -> bool {
        matches!(self, FunctionCode::Coils | FunctionCode::DiscreteInputs)
    }

    /// Maximum units a single request may carry for this FC: 2000 bits, 125 registers.
    pub const fn protocol_max_units(self) -> u16 {
        if self.is_bit_type() {
            2000
        } else {
            125
        }
    }

    pub const fn is_read_only(self) -> bool {
        true
    }

    /// Short semantic tag used on discovery records and in checkpoints.
    pub const fn tag(self) -> &'static str {
        match self {
            FunctionCode::Coils => "coil",
            FunctionCode::DiscreteInputs => "discrete",
            FunctionCode::HoldingRegisters => "holding",
            FunctionCode::InputRegisters => "input",
        }
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip() {
        for fc in FunctionCode::ALL {
            assert_eq!(FunctionCode::from_code(fc.code()), Some(fc));
        }
    }

    #[test]
    fn protocol_caps_match_spec() {
        assert_eq!(FunctionCode::Coils.protocol_max_units(), 2000);
        assert_eq!(FunctionCode::DiscreteInputs.protocol_max_units(), 2000);
        assert_eq!(FunctionCode::HoldingRegisters.protocol_max_units(), 125);
        assert_eq!(FunctionCode::InputRegisters.protocol_max_units(), 125);
    }
}
