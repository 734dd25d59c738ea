//! DEX Record Schemas
//!
//! The three persisted/transported record kinds of the exchange:
//!
//! - `Fund`: per-user custody ledger inside the Fund contract
//! - `Order`: what the Fund contract emits to the matcher
//! - `SettleOrders`: what the matcher reports back
//!
//! Field numbers are frozen protocol. Prices are fixed-point decimals
//! carried as scaled integers (scale 10^8); floats never touch consensus
//! state.

use serde::{Deserialize, Serialize};

use lib_types::{Address, TokenTag, ADDRESS_LEN, TOKEN_TAG_LEN};

use super::{Reader, WireError, WireResult, Writer};

/// Fixed-point scale for order prices: 10^8
pub const PRICE_SCALE: u64 = 100_000_000;

/// `quantity * price / PRICE_SCALE`, rounded half to even
///
/// None on u64 overflow of the final amount.
pub fn quote_amount(quantity: u64, price: u64) -> Option<u64> {
    let numer = quantity as u128 * price as u128;
    let denom = PRICE_SCALE as u128;
    let mut q = numer / denom;
    let r = numer % denom;
    match (r * 2).cmp(&denom) {
        std::cmp::Ordering::Greater => q += 1,
        std::cmp::Ordering::Equal => {
            if q % 2 == 1 {
                q += 1;
            }
        }
        std::cmp::Ordering::Less => {}
    }
    u64::try_from(q).ok()
}

fn read_address(reader: &mut Reader<'_>, field: u32) -> WireResult<Address> {
    let bytes = reader.read_bytes()?;
    Address::from_slice(bytes).ok_or(WireError::InvalidLength {
        field,
        expected: ADDRESS_LEN,
        got: bytes.len(),
    })
}

fn read_token(reader: &mut Reader<'_>, field: u32) -> WireResult<TokenTag> {
    let bytes = reader.read_bytes()?;
    TokenTag::from_slice(bytes).ok_or(WireError::InvalidLength {
        field,
        expected: TOKEN_TAG_LEN,
        got: bytes.len(),
    })
}

// ============================================================================
// FUND RECORD
// ============================================================================

/// One asset's custody entry: `{1: asset, 2: available, 3: locked}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountEntry {
    pub asset: TokenTag,
    pub available: u64,
    pub locked: u64,
}

impl AccountEntry {
    const FIELD_ASSET: u32 = 1;
    const FIELD_AVAILABLE: u32 = 2;
    const FIELD_LOCKED: u32 = 3;

    fn encode_into(&self, w: &mut Writer) {
        w.field_bytes(Self::FIELD_ASSET, self.asset.as_bytes());
        w.field_u64(Self::FIELD_AVAILABLE, self.available);
        w.field_u64(Self::FIELD_LOCKED, self.locked);
    }

    fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut entry = AccountEntry::default();
        let mut r = Reader::new(bytes);
        while !r.done() {
            let (field, wire_type) = r.next_field()?;
            match field {
                Self::FIELD_ASSET => entry.asset = read_token(&mut r, field)?,
                Self::FIELD_AVAILABLE => entry.available = r.read_varint()?,
                Self::FIELD_LOCKED => entry.locked = r.read_varint()?,
                _ => r.skip(wire_type)?,
            }
        }
        Ok(entry)
    }
}

/// Per-user custody ledger: `{1: repeated AccountEntry}`
///
/// At most one entry per asset; entries are created on first touch and
/// never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fund {
    pub accounts: Vec<AccountEntry>,
}

impl Fund {
    const FIELD_ACCOUNT: u32 = 1;

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        for entry in &self.accounts {
            let mut inner = Writer::new();
            entry.encode_into(&mut inner);
            w.field_message(Self::FIELD_ACCOUNT, &inner.into_bytes());
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut fund = Fund::default();
        let mut r = Reader::new(bytes);
        while !r.done() {
            let (field, wire_type) = r.next_field()?;
            match field {
                Self::FIELD_ACCOUNT => {
                    fund.accounts.push(AccountEntry::decode(r.read_bytes()?)?)
                }
                _ => r.skip(wire_type)?,
            }
        }
        Ok(fund)
    }

    /// Entry for `asset`, if the user ever touched it
    pub fn account(&self, asset: &TokenTag) -> Option<&AccountEntry> {
        self.accounts.iter().find(|a| &a.asset == asset)
    }

    /// Mutable entry for `asset`, created zeroed on first touch
    pub fn account_mut_or_insert(&mut self, asset: &TokenTag) -> &mut AccountEntry {
        match self.accounts.iter().position(|a| &a.asset == asset) {
            Some(i) => &mut self.accounts[i],
            None => {
                self.accounts.push(AccountEntry {
                    asset: *asset,
                    ..Default::default()
                });
                let last = self.accounts.len() - 1;
                &mut self.accounts[last]
            }
        }
    }
}

// ============================================================================
// ORDER
// ============================================================================

/// Limit or market order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum OrderType {
    #[default]
    Limited = 0,
    Market = 1,
}

impl OrderType {
    fn from_wire(field: u32, value: u32) -> WireResult<Self> {
        match value {
            0 => Ok(OrderType::Limited),
            1 => Ok(OrderType::Market),
            other => Err(WireError::InvalidEnum {
                field,
                value: other as u64,
            }),
        }
    }
}

/// Order lifecycle status
///
/// Any incoming non-Pending status is normalized to Pending on send; the
/// later states belong to the external matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum OrderStatus {
    #[default]
    Pending = 0,
    PartiallyExecuted = 1,
    FullyExecuted = 2,
    Cancelled = 3,
}

impl OrderStatus {
    fn from_wire(field: u32, value: u32) -> WireResult<Self> {
        match value {
            0 => Ok(OrderStatus::Pending),
            1 => Ok(OrderStatus::PartiallyExecuted),
            2 => Ok(OrderStatus::FullyExecuted),
            3 => Ok(OrderStatus::Cancelled),
            other => Err(WireError::InvalidEnum {
                field,
                value: other as u64,
            }),
        }
    }
}

/// What the Fund contract emits to the matcher
///
/// `side`: false = buy, true = sell. For a sell, `quantity` of
/// `trade_asset` is locked; for a buy, `amount` of `quote_asset`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub address: Address,
    pub trade_asset: TokenTag,
    pub quote_asset: TokenTag,
    pub side: bool,
    pub order_type: OrderType,
    /// Fixed-point, scale [`PRICE_SCALE`]
    pub price: u64,
    pub quantity: u64,
    pub amount: u64,
    pub status: OrderStatus,
    pub timestamp: i64,
}

impl Order {
    const FIELD_ID: u32 = 1;
    const FIELD_ADDRESS: u32 = 2;
    const FIELD_TRADE_ASSET: u32 = 3;
    const FIELD_QUOTE_ASSET: u32 = 4;
    const FIELD_SIDE: u32 = 5;
    const FIELD_TYPE: u32 = 6;
    const FIELD_PRICE: u32 = 7;
    const FIELD_QUANTITY: u32 = 8;
    const FIELD_AMOUNT: u32 = 9;
    const FIELD_STATUS: u32 = 10;
    const FIELD_TIMESTAMP: u32 = 11;

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.field_u64(Self::FIELD_ID, self.id);
        w.field_bytes(Self::FIELD_ADDRESS, self.address.as_bytes());
        w.field_bytes(Self::FIELD_TRADE_ASSET, self.trade_asset.as_bytes());
        w.field_bytes(Self::FIELD_QUOTE_ASSET, self.quote_asset.as_bytes());
        w.field_bool(Self::FIELD_SIDE, self.side);
        w.field_u32(Self::FIELD_TYPE, self.order_type as u32);
        w.field_u64(Self::FIELD_PRICE, self.price);
        w.field_u64(Self::FIELD_QUANTITY, self.quantity);
        w.field_u64(Self::FIELD_AMOUNT, self.amount);
        w.field_u32(Self::FIELD_STATUS, self.status as u32);
        w.field_i64(Self::FIELD_TIMESTAMP, self.timestamp);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut order = Order::default();
        let mut r = Reader::new(bytes);
        while !r.done() {
            let (field, wire_type) = r.next_field()?;
            match field {
                Self::FIELD_ID => order.id = r.read_varint()?,
                Self::FIELD_ADDRESS => order.address = read_address(&mut r, field)?,
                Self::FIELD_TRADE_ASSET => order.trade_asset = read_token(&mut r, field)?,
                Self::FIELD_QUOTE_ASSET => order.quote_asset = read_token(&mut r, field)?,
                Self::FIELD_SIDE => order.side = r.read_bool(field)?,
                Self::FIELD_TYPE => {
                    order.order_type = OrderType::from_wire(field, r.read_u32(field)?)?
                }
                Self::FIELD_PRICE => order.price = r.read_varint()?,
                Self::FIELD_QUANTITY => order.quantity = r.read_varint()?,
                Self::FIELD_AMOUNT => order.amount = r.read_varint()?,
                Self::FIELD_STATUS => {
                    order.status = OrderStatus::from_wire(field, r.read_u32(field)?)?
                }
                Self::FIELD_TIMESTAMP => order.timestamp = r.read_i64()?,
                _ => r.skip(wire_type)?,
            }
        }
        Ok(order)
    }
}

// ============================================================================
// SETTLEMENT
// ============================================================================

/// One balance mutation reported by the matcher
///
/// Absent fields are zero. Applied as
/// `available += inc_available - dec_available` and
/// `locked += inc_locked - dec_locked`, with any negative intermediate a
/// consistency violation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettleAction {
    pub address: Address,
    pub asset: TokenTag,
    pub inc_available: u64,
    pub dec_available: u64,
    pub inc_locked: u64,
    pub dec_locked: u64,
}

impl SettleAction {
    const FIELD_ADDRESS: u32 = 1;
    const FIELD_ASSET: u32 = 2;
    const FIELD_INC_AVAILABLE: u32 = 3;
    const FIELD_DEC_AVAILABLE: u32 = 4;
    const FIELD_INC_LOCKED: u32 = 5;
    const FIELD_DEC_LOCKED: u32 = 6;

    fn encode_into(&self, w: &mut Writer) {
        w.field_bytes(Self::FIELD_ADDRESS, self.address.as_bytes());
        w.field_bytes(Self::FIELD_ASSET, self.asset.as_bytes());
        w.field_u64(Self::FIELD_INC_AVAILABLE, self.inc_available);
        w.field_u64(Self::FIELD_DEC_AVAILABLE, self.dec_available);
        w.field_u64(Self::FIELD_INC_LOCKED, self.inc_locked);
        w.field_u64(Self::FIELD_DEC_LOCKED, self.dec_locked);
    }

    fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut action = SettleAction::default();
        let mut r = Reader::new(bytes);
        while !r.done() {
            let (field, wire_type) = r.next_field()?;
            match field {
                Self::FIELD_ADDRESS => action.address = read_address(&mut r, field)?,
                Self::FIELD_ASSET => action.asset = read_token(&mut r, field)?,
                Self::FIELD_INC_AVAILABLE => action.inc_available = r.read_varint()?,
                Self::FIELD_DEC_AVAILABLE => action.dec_available = r.read_varint()?,
                Self::FIELD_INC_LOCKED => action.inc_locked = r.read_varint()?,
                Self::FIELD_DEC_LOCKED => action.dec_locked = r.read_varint()?,
                _ => r.skip(wire_type)?,
            }
        }
        Ok(action)
    }
}

/// Ordered settle envelope: `{1: repeated SettleAction}`, applied
/// all-or-nothing
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettleOrders {
    pub actions: Vec<SettleAction>,
}

impl SettleOrders {
    const FIELD_ACTION: u32 = 1;

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        for action in &self.actions {
            let mut inner = Writer::new();
            action.encode_into(&mut inner);
            w.field_message(Self::FIELD_ACTION, &inner.into_bytes());
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut envelope = SettleOrders::default();
        let mut r = Reader::new(bytes);
        while !r.done() {
            let (field, wire_type) = r.next_field()?;
            match field {
                Self::FIELD_ACTION => envelope
                    .actions
                    .push(SettleAction::decode(r.read_bytes()?)?),
                _ => r.skip(wire_type)?,
            }
        }
        Ok(envelope)
    }
}
