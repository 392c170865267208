// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::FRACTION_SCALE;
use crate::domain::error::AppError;
use crate::services::rebalance::router_op::magic::get_magic_offsets;
use crate::services::rebalance::router_op::program::RouterProgram;
use crate::services::rebalance::router_op::stores::{StoreFile, StoreKey};
use alloy::primitives::{Address, Bytes, U256};
use serde::Serialize;

const SELECTOR_LEN: usize = 4;
const WORD: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreOpType {
    /// Patch `store.initial * fraction` into calldata.
    AssignValue,
    /// Patch `store.current * fraction` into calldata.
    AssignCall,
    /// As `AssignCall`, then debit the store by the patched amount.
    AssignCallSubtract,
    /// After the call, add `returndata[offset] * fraction` to the store.
    RetrieveResultAdd,
    /// After the call, overwrite the store with `returndata[offset] * fraction`.
    RetrieveResultAssign,
    /// `store -= secondary * fraction`, no calldata involved.
    SubtractStoreFromStore,
}

impl StoreOpType {
    /// Wire discriminant understood by the interpreter.
    pub fn code(&self) -> u8 {
        match self {
            StoreOpType::AssignValue => 0,
            StoreOpType::AssignCall => 1,
            StoreOpType::AssignCallSubtract => 2,
            StoreOpType::RetrieveResultAdd => 3,
            StoreOpType::RetrieveResultAssign => 4,
            StoreOpType::SubtractStoreFromStore => 5,
        }
    }

    /// Runs before the call (calldata patch) rather than after it.
    pub fn is_patch(&self) -> bool {
        matches!(
            self,
            StoreOpType::AssignValue | StoreOpType::AssignCall | StoreOpType::AssignCallSubtract
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOperation {
    pub op_type: StoreOpType,
    pub store_number: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_store_number: Option<usize>,
    /// Calldata offset for patches, return-data offset for retrieves.
    pub offset: usize,
    /// Fixed-point share, `FRACTION_SCALE` == 1.0.
    pub fraction: u64,
}

impl StoreOperation {
    fn new(op_type: StoreOpType, store_number: usize, offset: usize, fraction: u64) -> Self {
        Self {
            op_type,
            store_number,
            secondary_store_number: None,
            offset,
            fraction,
        }
    }

    pub fn retrieve_add(store_number: usize, offset: usize) -> Self {
        Self::new(StoreOpType::RetrieveResultAdd, store_number, offset, FRACTION_SCALE)
    }

    pub fn retrieve_assign(store_number: usize, offset: usize) -> Self {
        Self::new(StoreOpType::RetrieveResultAssign, store_number, offset, FRACTION_SCALE)
    }

    pub fn subtract_store(store_number: usize, secondary: usize, fraction: u64) -> Self {
        Self {
            secondary_store_number: Some(secondary),
            ..Self::new(StoreOpType::SubtractStoreFromStore, store_number, 0, fraction)
        }
    }
}

/// Native value forwarded with a step, taken from a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallValue {
    pub store_number: usize,
    pub fraction: u64,
    pub subtract: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStep {
    pub step_address: Address,
    pub step_encoded_call: Bytes,
    pub store_operations: Vec<StoreOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_value: Option<CallValue>,
}

/// Amount argument resolved from a store at execution time. Inputs are matched to
/// magic sentinels by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallInput {
    /// Debit `fraction` of the store's live value and pass it.
    Spend { store: usize, fraction: u64 },
    /// Pass `fraction` of the store's live value without debiting.
    Read { store: usize, fraction: u64 },
    /// Pass `fraction` of the store's initial value.
    Initial { store: usize, fraction: u64 },
}

/// A call whose amount arguments were encoded as sentinels `0..inputs.len()`.
#[derive(Debug, Clone)]
pub struct PatchedCall {
    pub target: Address,
    pub encoded: Vec<u8>,
    pub inputs: Vec<CallInput>,
    pub results: Vec<StoreOperation>,
    pub call_value: Option<CallValue>,
}

impl PatchedCall {
    pub fn new(target: Address, encoded: Vec<u8>) -> Self {
        Self {
            target,
            encoded,
            inputs: Vec::new(),
            results: Vec::new(),
            call_value: None,
        }
    }

    pub fn input(mut self, input: CallInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn result(mut self, op: StoreOperation) -> Self {
        self.results.push(op);
        self
    }

    pub fn value(mut self, call_value: CallValue) -> Self {
        self.call_value = Some(call_value);
        self
    }
}

/// Register-machine program under construction: the store file plus the steps
/// that read and write it.
#[derive(Debug, Clone, Default)]
pub struct RouterOperation {
    stores: StoreFile,
    steps: Vec<DetailedStep>,
}

impl RouterOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_or_initialize_store_idx(
        &mut self,
        key: StoreKey,
        value: Option<U256>,
    ) -> Result<usize, AppError> {
        self.stores.find_or_initialize_store_idx(key, value)
    }

    pub fn stores(&self) -> &StoreFile {
        &self.stores
    }

    pub fn steps(&self) -> &[DetailedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn add_step(&mut self, step: DetailedStep) -> usize {
        self.steps.push(step);
        self.steps.len() - 1
    }

    /// Resolves the call's sentinels to offsets and appends it as a step:
    /// patches first, then result operations.
    pub fn add_patched_call(&mut self, call: PatchedCall) -> Result<usize, AppError> {
        let (patched, offsets) = get_magic_offsets(&call.encoded, call.inputs.len())?;
        let mut ops = Vec::with_capacity(call.inputs.len() + call.results.len());
        for (input, offset) in call.inputs.iter().zip(offsets) {
            let (op_type, store, fraction) = match *input {
                CallInput::Spend { store, fraction } => {
                    (StoreOpType::AssignCallSubtract, store, fraction)
                }
                CallInput::Read { store, fraction } => (StoreOpType::AssignCall, store, fraction),
                CallInput::Initial { store, fraction } => {
                    (StoreOpType::AssignValue, store, fraction)
                }
            };
            ops.push(StoreOperation::new(op_type, store, offset, fraction));
        }
        ops.extend(call.results);

        Ok(self.add_step(DetailedStep {
            step_address: call.target,
            step_encoded_call: Bytes::from(patched),
            store_operations: ops,
            call_value: call.call_value,
        }))
    }

    /// Appends another operation's steps, remapping its stores into this file.
    pub fn extend(&mut self, other: RouterOperation) -> Result<(), AppError> {
        let mut remap = Vec::with_capacity(other.stores.len());
        for store in other.stores.into_stores() {
            let idx = match self.stores.find(&store.key) {
                Some(idx) if store.value.is_none() => idx,
                _ => self.stores.find_or_initialize_store_idx(store.key, store.value)?,
            };
            remap.push(idx);
        }
        let lookup = |idx: usize| {
            remap.get(idx).copied().ok_or_else(|| AppError::InvalidStoreOperation {
                step: 0,
                reason: format!("store {idx} out of range while merging"),
            })
        };
        for mut step in other.steps {
            for op in &mut step.store_operations {
                op.store_number = lookup(op.store_number)?;
                if let Some(secondary) = op.secondary_store_number {
                    op.secondary_store_number = Some(lookup(secondary)?);
                }
            }
            if let Some(value) = step.call_value.as_mut() {
                value.store_number = lookup(value.store_number)?;
            }
            self.steps.push(step);
        }
        Ok(())
    }

    /// Checks that every offset lands on an argument slot, every store index exists
    /// and no store is read before something writes it.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut written: Vec<bool> = self.stores.iter().map(|s| s.value.is_some()).collect();
        let seeded = written.clone();
        let store_count = written.len();

        for (step_idx, step) in self.steps.iter().enumerate() {
            let fail = |reason: String| AppError::InvalidStoreOperation {
                step: step_idx,
                reason,
            };
            let check_store = |idx: usize| -> Result<(), AppError> {
                if idx >= store_count {
                    return Err(fail(format!("store {idx} does not exist")));
                }
                Ok(())
            };
            let call_len = step.step_encoded_call.len();

            if let Some(value) = &step.call_value {
                check_store(value.store_number)?;
                if !written[value.store_number] {
                    return Err(fail(format!("call value reads uninitialized store {}", value.store_number)));
                }
                if value.fraction > FRACTION_SCALE {
                    return Err(fail(format!("call value fraction {} above scale", value.fraction)));
                }
            }

            let (patches, results): (Vec<_>, Vec<_>) = step
                .store_operations
                .iter()
                .partition(|op| op.op_type.is_patch());

            for op in patches {
                check_store(op.store_number)?;
                if op.fraction > FRACTION_SCALE {
                    return Err(fail(format!("fraction {} above scale", op.fraction)));
                }
                if op.offset < SELECTOR_LEN
                    || (op.offset - SELECTOR_LEN) % WORD != 0
                    || op.offset + WORD > call_len
                {
                    return Err(fail(format!(
                        "offset {} is not an argument slot of a {call_len}-byte call",
                        op.offset
                    )));
                }
                let readable = match op.op_type {
                    StoreOpType::AssignValue => seeded[op.store_number],
                    _ => written[op.store_number],
                };
                if !readable {
                    return Err(fail(format!("store {} read before initialization", op.store_number)));
                }
            }

            for op in results {
                check_store(op.store_number)?;
                if op.fraction > FRACTION_SCALE {
                    return Err(fail(format!("fraction {} above scale", op.fraction)));
                }
                match op.op_type {
                    StoreOpType::SubtractStoreFromStore => {
                        let secondary = op
                            .secondary_store_number
                            .ok_or_else(|| fail("subtract without secondary store".to_string()))?;
                        check_store(secondary)?;
                        if !written[op.store_number] || !written[secondary] {
                            return Err(fail("subtract reads uninitialized store".to_string()));
                        }
                    }
                    _ => {
                        if op.offset % WORD != 0 {
                            return Err(fail(format!("return offset {} not word aligned", op.offset)));
                        }
                        written[op.store_number] = true;
                    }
                }
            }
        }
        Ok(())
    }

    /// Validated, interpreter-ready form.
    pub fn into_program(self) -> Result<RouterProgram, AppError> {
        self.validate()?;
        Ok(RouterProgram {
            stores: self.stores.initial_values(),
            steps: self.steps,
        })
    }
}
