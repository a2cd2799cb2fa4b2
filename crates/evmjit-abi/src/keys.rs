//! Typed views of the boundary enums and the per-key variant shapes.

use crate::raw::{
    evm_call_kind, evm_mode, evm_query_key, evm_update_key, EVM_ADDRESS, EVM_BALANCE,
    EVM_BLOCKHASH, EVM_CALL, EVM_CALLCODE, EVM_CALLER, EVM_CODE_BY_ADDRESS, EVM_COINBASE,
    EVM_CREATE, EVM_DELEGATECALL, EVM_DIFFICULTY, EVM_FRONTIER, EVM_GAS_LIMIT, EVM_GAS_PRICE,
    EVM_HOMESTEAD, EVM_LOG, EVM_NUMBER, EVM_ORIGIN, EVM_SELFDESTRUCT, EVM_SLOAD, EVM_SSTORE,
    EVM_TIMESTAMP,
};

/// Which member of `evm_variant` is valid at a given call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariantShape {
    Unused,
    Int64,
    Uint256,
    Hash256,
    Address,
    Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    Sload,
    Address,
    Caller,
    Origin,
    GasPrice,
    Coinbase,
    Difficulty,
    GasLimit,
    Number,
    Timestamp,
    CodeByAddress,
    Balance,
    Blockhash,
}

impl QueryKey {
    pub const ALL: [QueryKey; 13] = [
        QueryKey::Sload,
        QueryKey::Address,
        QueryKey::Caller,
        QueryKey::Origin,
        QueryKey::GasPrice,
        QueryKey::Coinbase,
        QueryKey::Difficulty,
        QueryKey::GasLimit,
        QueryKey::Number,
        QueryKey::Timestamp,
        QueryKey::CodeByAddress,
        QueryKey::Balance,
        QueryKey::Blockhash,
    ];

    pub fn from_raw(key: evm_query_key) -> Option<Self> {
        match key {
            EVM_SLOAD => Some(QueryKey::Sload),
            EVM_ADDRESS => Some(QueryKey::Address),
            EVM_CALLER => Some(QueryKey::Caller),
            EVM_ORIGIN => Some(QueryKey::Origin),
            EVM_GAS_PRICE => Some(QueryKey::GasPrice),
            EVM_COINBASE => Some(QueryKey::Coinbase),
            EVM_DIFFICULTY => Some(QueryKey::Difficulty),
            EVM_GAS_LIMIT => Some(QueryKey::GasLimit),
            EVM_NUMBER => Some(QueryKey::Number),
            EVM_TIMESTAMP => Some(QueryKey::Timestamp),
            EVM_CODE_BY_ADDRESS => Some(QueryKey::CodeByAddress),
            EVM_BALANCE => Some(QueryKey::Balance),
            EVM_BLOCKHASH => Some(QueryKey::Blockhash),
            _ => None,
        }
    }

    pub fn to_raw(self) -> evm_query_key {
        match self {
            QueryKey::Sload => EVM_SLOAD,
            QueryKey::Address => EVM_ADDRESS,
            QueryKey::Caller => EVM_CALLER,
            QueryKey::Origin => EVM_ORIGIN,
            QueryKey::GasPrice => EVM_GAS_PRICE,
            QueryKey::Coinbase => EVM_COINBASE,
            QueryKey::Difficulty => EVM_DIFFICULTY,
            QueryKey::GasLimit => EVM_GAS_LIMIT,
            QueryKey::Number => EVM_NUMBER,
            QueryKey::Timestamp => EVM_TIMESTAMP,
            QueryKey::CodeByAddress => EVM_CODE_BY_ADDRESS,
            QueryKey::Balance => EVM_BALANCE,
            QueryKey::Blockhash => EVM_BLOCKHASH,
        }
    }

    pub fn arg_shape(self) -> VariantShape {
        match self {
            QueryKey::Sload => VariantShape::Uint256,
            QueryKey::CodeByAddress | QueryKey::Balance => VariantShape::Address,
            QueryKey::Blockhash => VariantShape::Int64,
            _ => VariantShape::Unused,
        }
    }

    pub fn result_shape(self) -> VariantShape {
        match self {
            QueryKey::Sload | QueryKey::GasPrice | QueryKey::Difficulty | QueryKey::Balance => {
                VariantShape::Uint256
            }
            QueryKey::Address | QueryKey::Caller | QueryKey::Origin | QueryKey::Coinbase => {
                VariantShape::Address
            }
            QueryKey::GasLimit | QueryKey::Number | QueryKey::Timestamp => VariantShape::Int64,
            QueryKey::CodeByAddress => VariantShape::Bytes,
            QueryKey::Blockhash => VariantShape::Hash256,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryKey::Sload => "sload",
            QueryKey::Address => "address",
            QueryKey::Caller => "caller",
            QueryKey::Origin => "origin",
            QueryKey::GasPrice => "gas_price",
            QueryKey::Coinbase => "coinbase",
            QueryKey::Difficulty => "difficulty",
            QueryKey::GasLimit => "gas_limit",
            QueryKey::Number => "number",
            QueryKey::Timestamp => "timestamp",
            QueryKey::CodeByAddress => "code_by_address",
            QueryKey::Balance => "balance",
            QueryKey::Blockhash => "blockhash",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKey {
    Sstore,
    Log,
    Selfdestruct,
}

impl UpdateKey {
    pub fn from_raw(key: evm_update_key) -> Option<Self> {
        match key {
            EVM_SSTORE => Some(UpdateKey::Sstore),
            EVM_LOG => Some(UpdateKey::Log),
            EVM_SELFDESTRUCT => Some(UpdateKey::Selfdestruct),
            _ => None,
        }
    }

    pub fn to_raw(self) -> evm_update_key {
        match self {
            UpdateKey::Sstore => EVM_SSTORE,
            UpdateKey::Log => EVM_LOG,
            UpdateKey::Selfdestruct => EVM_SELFDESTRUCT,
        }
    }

    /// Shapes of the two arguments. LOG topics travel as one byte reference
    /// holding `32 * n` big-endian topic bytes.
    pub fn arg_shapes(self) -> (VariantShape, VariantShape) {
        match self {
            UpdateKey::Sstore => (VariantShape::Uint256, VariantShape::Uint256),
            UpdateKey::Log => (VariantShape::Bytes, VariantShape::Bytes),
            UpdateKey::Selfdestruct => (VariantShape::Address, VariantShape::Unused),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    Call,
    DelegateCall,
    CallCode,
    Create,
}

impl CallKind {
    pub fn from_raw(kind: evm_call_kind) -> Option<Self> {
        match kind {
            EVM_CALL => Some(CallKind::Call),
            EVM_DELEGATECALL => Some(CallKind::DelegateCall),
            EVM_CALLCODE => Some(CallKind::CallCode),
            EVM_CREATE => Some(CallKind::Create),
            _ => None,
        }
    }

    pub fn to_raw(self) -> evm_call_kind {
        match self {
            CallKind::Call => EVM_CALL,
            CallKind::DelegateCall => EVM_DELEGATECALL,
            CallKind::CallCode => EVM_CALLCODE,
            CallKind::Create => EVM_CREATE,
        }
    }

    /// False for DELEGATECALL: the callee runs with the caller's value.
    pub fn transfers_value(self) -> bool {
        !matches!(self, CallKind::DelegateCall)
    }

    /// False for CREATE: the target address is ignored.
    pub fn has_target(self) -> bool {
        !matches!(self, CallKind::Create)
    }
}

/// Compatibility (chain) mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mode {
    Frontier,
    #[default]
    Homestead,
}

impl Mode {
    pub fn from_raw(mode: evm_mode) -> Option<Self> {
        match mode {
            EVM_FRONTIER => Some(Mode::Frontier),
            EVM_HOMESTEAD => Some(Mode::Homestead),
            _ => None,
        }
    }

    pub fn to_raw(self) -> evm_mode {
        match self {
            Mode::Frontier => EVM_FRONTIER,
            Mode::Homestead => EVM_HOMESTEAD,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Frontier => "frontier",
            Mode::Homestead => "homestead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "frontier" => Some(Mode::Frontier),
            "homestead" => Some(Mode::Homestead),
            _ => None,
        }
    }
}

#[cfg(feature = "clap")]
impl clap::ValueEnum for Mode {
    fn value_variants<'a>() -> &'a [Self] {
        const ALL: [Mode; 2] = [Mode::Frontier, Mode::Homestead];
        &ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_keys_round_trip_through_raw() {
        for key in QueryKey::ALL {
            assert_eq!(QueryKey::from_raw(key.to_raw()), Some(key));
        }
        assert_eq!(QueryKey::from_raw(13), None);
    }

    #[test]
    fn query_key_values_are_abi_stable() {
        assert_eq!(QueryKey::Sload.to_raw(), 0);
        assert_eq!(QueryKey::GasPrice.to_raw(), 4);
        assert_eq!(QueryKey::Blockhash.to_raw(), 12);
    }

    #[test]
    fn query_table_shapes() {
        use VariantShape::*;
        let table = [
            (QueryKey::Sload, Uint256, Uint256),
            (QueryKey::Address, Unused, Address),
            (QueryKey::Caller, Unused, Address),
            (QueryKey::Origin, Unused, Address),
            (QueryKey::GasPrice, Unused, Uint256),
            (QueryKey::Coinbase, Unused, Address),
            (QueryKey::Difficulty, Unused, Uint256),
            (QueryKey::GasLimit, Unused, Int64),
            (QueryKey::Number, Unused, Int64),
            (QueryKey::Timestamp, Unused, Int64),
            (QueryKey::CodeByAddress, Address, Bytes),
            (QueryKey::Balance, Address, Uint256),
            (QueryKey::Blockhash, Int64, Hash256),
        ];
        assert_eq!(table.len(), QueryKey::ALL.len());
        for ((key, arg, result), listed) in table.into_iter().zip(QueryKey::ALL) {
            assert_eq!(key, listed);
            assert_eq!(key.arg_shape(), arg, "{}", key.as_str());
            assert_eq!(key.result_shape(), result, "{}", key.as_str());
        }
    }

    #[test]
    fn call_kind_parameter_semantics() {
        assert!(!CallKind::DelegateCall.transfers_value());
        assert!(CallKind::CallCode.transfers_value());
        assert!(!CallKind::Create.has_target());
        assert_eq!(CallKind::from_raw(4), None);
    }

    #[test]
    fn modes_parse() {
        assert_eq!(Mode::parse("frontier"), Some(Mode::Frontier));
        assert_eq!(Mode::parse(" homestead "), Some(Mode::Homestead));
        assert_eq!(Mode::parse("byzantium"), None);
        assert_eq!(Mode::from_raw(2), None);
    }
}
