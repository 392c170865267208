// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::services::rebalance::router_op::operation::{DetailedStep, StoreOperation};
use alloy::primitives::{Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use serde::Serialize;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    #[sol(rpc)]
    contract RouterInterpreter {
        struct StoreOp {
            uint8 opType;
            uint16 storeNumber;
            uint16 secondaryStoreNumber;
            uint32 offset;
            uint64 fraction;
        }
        struct StepValue {
            bool enabled;
            uint16 storeNumber;
            uint64 fraction;
            bool subtract;
        }
        struct Step {
            address target;
            bytes data;
            StoreOp[] ops;
            StepValue value;
        }
        function execute(Step[] calldata steps, uint256[] calldata stores) external payable;
    }
}

/// Interpreter input: steps plus the raw initial value of every store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterProgram {
    pub steps: Vec<DetailedStep>,
    pub stores: Vec<U256>,
}

fn narrow<T: TryFrom<usize>>(value: usize, field: &str) -> Result<T, AppError> {
    T::try_from(value).map_err(|_| AppError::Validation {
        field: field.to_string(),
        message: format!("{value} does not fit the interpreter encoding"),
    })
}

fn encode_op(op: &StoreOperation) -> Result<RouterInterpreter::StoreOp, AppError> {
    Ok(RouterInterpreter::StoreOp {
        opType: op.op_type.code(),
        storeNumber: narrow(op.store_number, "storeNumber")?,
        secondaryStoreNumber: match op.secondary_store_number {
            Some(s) => narrow(s, "secondaryStoreNumber")?,
            None => u16::MAX,
        },
        offset: narrow(op.offset, "offset")?,
        fraction: op.fraction,
    })
}

impl RouterProgram {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// ABI-encoded `execute(steps, stores)` for the on-chain interpreter.
    pub fn encode_execute_call(&self) -> Result<Bytes, AppError> {
        let mut steps = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let ops = step
                .store_operations
                .iter()
                .map(encode_op)
                .collect::<Result<Vec<_>, _>>()?;
            let value = match &step.call_value {
                Some(v) => RouterInterpreter::StepValue {
                    enabled: true,
                    storeNumber: narrow(v.store_number, "callValue.storeNumber")?,
                    fraction: v.fraction,
                    subtract: v.subtract,
                },
                None => RouterInterpreter::StepValue {
                    enabled: false,
                    storeNumber: 0,
                    fraction: 0,
                    subtract: false,
                },
            };
            steps.push(RouterInterpreter::Step {
                target: step.step_address,
                data: step.step_encoded_call.clone(),
                ops,
                value,
            });
        }
        let call = RouterInterpreter::executeCall {
            steps,
            stores: self.stores.clone(),
        };
        Ok(Bytes::from(call.abi_encode()))
    }
}
