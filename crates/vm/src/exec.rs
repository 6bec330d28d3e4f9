//! Deterministic replay and single-line checking.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use snark_dispute_params::{FIELD_PRIME, NUM_REGISTERS};

use crate::{Instruction, Opcode, SavedProgram};

fn bool_reg(value: bool) -> BigUint {
    if value {
        BigUint::one()
    } else {
        BigUint::zero()
    }
}

/// Seeds the register file from a proof witness: witness values reduced into the field,
/// remaining registers zero.
pub fn initial_registers(witness: &[BigUint]) -> Vec<BigUint> {
    let mut regs = vec![BigUint::zero(); NUM_REGISTERS];
    for (reg, value) in regs.iter_mut().zip(witness.iter()) {
        *reg = value % &*FIELD_PRIME;
    }
    regs
}

/// Applies one instruction to the register file.
///
/// Assertions never touch registers; their outcome only matters to
/// [`program_succeeds`] and to the on-chain instruction check.
pub fn execute_line(regs: &mut [BigUint], instr: &Instruction) {
    let p = &*FIELD_PRIME;
    let a = &regs[instr.param1 as usize];
    let b = &regs[instr.param2 as usize];
    let result = match instr.op {
        Opcode::Addmod => (a + b) % p,
        Opcode::Submod => ((a + p) - b) % p,
        Opcode::Mulmod => (a * b) % p,
        Opcode::Divmod => {
            if b.is_zero() {
                BigUint::zero()
            } else {
                a * b.modpow(&(p - 2u8), p) % p
            }
        }
        Opcode::Andbit => {
            let bit = instr.bit.expect("validated at load");
            if a.bit(bit) {
                b.clone()
            } else {
                BigUint::zero()
            }
        }
        Opcode::Andnotbit => {
            let bit = instr.bit.expect("validated at load");
            if a.bit(bit) {
                BigUint::zero()
            } else {
                b.clone()
            }
        }
        Opcode::Mov => a.clone(),
        Opcode::Equal => bool_reg(a == b),
        Opcode::Or => bool_reg(!a.is_zero() || !b.is_zero()),
        Opcode::And => bool_reg(!a.is_zero() && !b.is_zero()),
        Opcode::Not => bool_reg(a.is_zero()),
        Opcode::AssertOne | Opcode::AssertZero => return,
    };
    regs[instr.target as usize] = result;
}

/// Replays the program from line 0 up to (excluding) `to_line`, clamped at the program
/// end, and returns the register snapshot.
pub fn replay(program: &SavedProgram, witness: &[BigUint], to_line: u64) -> Vec<BigUint> {
    let mut regs = initial_registers(witness);
    let stop = to_line.min(program.len());
    for line in 0..stop {
        execute_line(&mut regs, &program.lines[line as usize]);
    }
    regs
}

/// Replays the whole program and reports whether every assertion held.
pub fn program_succeeds(program: &SavedProgram, witness: &[BigUint]) -> bool {
    let mut regs = initial_registers(witness);
    for instr in &program.lines {
        match instr.op {
            Opcode::AssertOne => {
                if !regs[instr.param1 as usize].is_one() {
                    return false;
                }
            }
            Opcode::AssertZero => {
                if !regs[instr.param1 as usize].is_zero() {
                    return false;
                }
            }
            _ => execute_line(&mut regs, instr),
        }
    }
    true
}

/// The quotient operand published alongside a multiplication or division, relating the
/// wide product to its field reduction. Zero for every other opcode.
pub fn quotient(instr: &Instruction, a: &BigUint, b: &BigUint, c: &BigUint) -> BigUint {
    let p = &*FIELD_PRIME;
    match instr.op {
        Opcode::Mulmod => {
            let product = a * b;
            if &product >= c {
                (product - c) / p
            } else {
                BigUint::zero()
            }
        }
        Opcode::Divmod => {
            let product = c * b;
            if &product >= a {
                (product - a) / p
            } else {
                BigUint::zero()
            }
        }
        _ => BigUint::zero(),
    }
}

/// Checks a single instruction against its published operands: `a` and `b` read before
/// the line, `c` written after it, `d` the published quotient.
///
/// This is the off-chain mirror of the on-chain instruction check; a `false` here is
/// the signal that the published execution of this line was wrong.
pub fn check_line(instr: &Instruction, a: &BigUint, b: &BigUint, c: &BigUint, d: &BigUint) -> bool {
    let p = &*FIELD_PRIME;
    match instr.op {
        Opcode::Addmod => (a + b) % p == *c,
        Opcode::Submod => ((a % p) + p - (b % p)) % p == *c,
        // the quotient ties the wide product to the claimed reduction
        Opcode::Mulmod => c < p && a * b == d * p + c,
        Opcode::Divmod => c < p && c * b == d * p + a,
        Opcode::Andbit => {
            let bit = instr.bit.unwrap_or(0);
            if a.bit(bit) {
                c == b
            } else {
                c.is_zero()
            }
        }
        Opcode::Andnotbit => {
            let bit = instr.bit.unwrap_or(0);
            if a.bit(bit) {
                c.is_zero()
            } else {
                c == b
            }
        }
        Opcode::Mov => c == a,
        Opcode::Equal => *c == bool_reg(a == b),
        Opcode::Or => *c == bool_reg(!a.is_zero() || !b.is_zero()),
        Opcode::And => *c == bool_reg(!a.is_zero() && !b.is_zero()),
        Opcode::Not => *c == bool_reg(a.is_zero()),
        Opcode::AssertOne => a.is_one(),
        Opcode::AssertZero => a.is_zero(),
    }
}
