use rand::{Rng, RngCore};

use crate::constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH, GLYPH_SIZE, STACK_DEPTH, VF};
use crate::error::Chip8Error;
use crate::opcode::Opcode;
use crate::state::State;

// Every operation receives the state with the pc already moved past the
// instruction being executed.

/// Address of the instruction currently executing
fn current_address(state: &State) -> u16 {
    state.pc.wrapping_sub(0x2)
}

/// Skips the next instruction if `condition` holds
fn skip_if(state: &State, condition: bool) -> Result<State, Chip8Error> {
    let pc = if condition {
        state.pc.wrapping_add(0x2)
    } else {
        state.pc
    };
    Ok(State { pc, ..*state })
}

/// clear
pub fn clr(_op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    Ok(State {
        frame_buffer: [[0; DISPLAY_WIDTH]; DISPLAY_HEIGHT],
        ..*state
    })
}

/// PC = STACK.pop()
pub fn rts(_op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    if state.sp == 0 {
        return Err(Chip8Error::StackUnderflow {
            address: current_address(state),
        });
    }
    let sp = state.sp - 0x1;
    Ok(State {
        pc: state.stack[sp as usize],
        sp,
        ..*state
    })
}

/// PC = addr
pub fn jump(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    Ok(State {
        pc: op.nnn(),
        ..*state
    })
}

/// STACK.push(PC); PC = addr
pub fn call(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    if state.sp as usize >= STACK_DEPTH {
        return Err(Chip8Error::StackOverflow {
            address: current_address(state),
        });
    }
    let mut stack = state.stack;
    stack[state.sp as usize] = state.pc;
    Ok(State {
        pc: op.nnn(),
        sp: state.sp + 0x1,
        stack,
        ..*state
    })
}

/// if Vx == kk then pc += 2
pub fn ske(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    skip_if(state, state.v[op.x() as usize] == op.nn())
}

/// if Vx != kk then pc += 2
pub fn skne(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    skip_if(state, state.v[op.x() as usize] != op.nn())
}

/// if Vx == Vy then pc += 2
pub fn skre(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    skip_if(state, state.v[op.x() as usize] == state.v[op.y() as usize])
}

/// Vx = kk
pub fn load(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let mut v = state.v;
    v[op.x() as usize] = op.nn();
    Ok(State { v, ..*state })
}

/// Vx += kk
/// Add kk to Vx; allow for overflow but implicitly drop it
pub fn add(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let mut v = state.v;
    v[op.x() as usize] = v[op.x() as usize].wrapping_add(op.nn());
    Ok(State { v, ..*state })
}

/// Vx = Vy
pub fn mv(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let mut v = state.v;
    v[op.x() as usize] = v[op.y() as usize];
    Ok(State { v, ..*state })
}

/// Vx |= Vy; VF = 0
pub fn or(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let mut v = state.v;
    v[op.x() as usize] |= v[op.y() as usize];
    v[VF] = 0x0;
    Ok(State { v, ..*state })
}

/// Vx &= Vy; VF = 0
pub fn and(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let mut v = state.v;
    v[op.x() as usize] &= v[op.y() as usize];
    v[VF] = 0x0;
    Ok(State { v, ..*state })
}

/// Vx ^= Vy; VF = 0
pub fn xor(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let mut v = state.v;
    v[op.x() as usize] ^= v[op.y() as usize];
    v[VF] = 0x0;
    Ok(State { v, ..*state })
}

/// Vx += Vy; VF = overflow
pub fn addr(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let (res, over) = state.v[op.x() as usize].overflowing_add(state.v[op.y() as usize]);
    let mut v = state.v;
    v[op.x() as usize] = res;
    v[VF] = over as u8;
    Ok(State { v, ..*state })
}

/// Vx -= Vy; VF = !underflow
pub fn sub(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let (res, under) = state.v[op.x() as usize].overflowing_sub(state.v[op.y() as usize]);
    let mut v = state.v;
    v[op.x() as usize] = res;
    v[VF] = !under as u8;
    Ok(State { v, ..*state })
}

/// Vx = Vy >> 1; VF = lsb(Vy)
/// Shifts take Vy as their source rather than Vx
pub fn shr(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let source = state.v[op.y() as usize];
    let mut v = state.v;
    v[op.x() as usize] = source >> 1;
    v[VF] = source & 0x1;
    Ok(State { v, ..*state })
}

/// Vx = Vy - Vx; VF = !underflow
pub fn subn(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let (res, under) = state.v[op.y() as usize].overflowing_sub(state.v[op.x() as usize]);
    let mut v = state.v;
    v[op.x() as usize] = res;
    v[VF] = !under as u8;
    Ok(State { v, ..*state })
}

/// Vx = Vy << 1; VF = msb(Vy)
pub fn shl(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let source = state.v[op.y() as usize];
    let mut v = state.v;
    v[op.x() as usize] = source << 1;
    v[VF] = source >> 7;
    Ok(State { v, ..*state })
}

/// if Vx != Vy then pc += 2
pub fn skrne(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    skip_if(state, state.v[op.x() as usize] != state.v[op.y() as usize])
}

/// I = addr
pub fn loadi(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    Ok(State {
        i: op.nnn(),
        ..*state
    })
}

/// PC = V0 + addr
pub fn jumpi(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    Ok(State {
        pc: u16::from(state.v[0x0]) + op.nnn(),
        ..*state
    })
}

/// Vx = rand_byte & kk
pub fn rand(op: &dyn Opcode, state: &State, rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let rand_byte: u8 = rng.gen();
    let mut v = state.v;
    v[op.x() as usize] = rand_byte & op.nn();
    Ok(State { v, ..*state })
}

/// draw_sprite(x=Vx y=Vy size=n)
/// XORs a sprite from memory i..i+n at position x, y on the FrameBuffer.
/// The start position wraps around the screen but the sprite itself is
/// clipped at the right and bottom edges.
/// Sets VF if any pixels are erased
pub fn draw(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let mut v = state.v;
    let mut frame_buffer = state.frame_buffer;

    let x0 = state.v[op.x() as usize] as usize % DISPLAY_WIDTH;
    let y0 = state.v[op.y() as usize] as usize % DISPLAY_HEIGHT;

    // Reset the carry flag (used for collision detection)
    v[VF] = 0x0;

    for row in 0..op.n() as usize {
        let y = y0 + row;
        if y >= DISPLAY_HEIGHT {
            break;
        }
        let sprite_row = state.read(state.i.wrapping_add(row as u16));
        for bit in 0..8 {
            let x = x0 + bit;
            if x >= DISPLAY_WIDTH {
                break;
            }
            let pixel_value = (sprite_row >> (7 - bit)) & 1;
            v[VF] |= pixel_value & frame_buffer[y][x];
            frame_buffer[y][x] ^= pixel_value;
        }
    }

    Ok(State {
        draw_flag: true,
        v,
        frame_buffer,
        ..*state
    })
}

/// if Vx.pressed then pc += 2
pub fn skpr(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let key = state.v[op.x() as usize] & 0xF;
    skip_if(state, state.keys[key as usize])
}

/// if !Vx.pressed then pc += 2
pub fn skup(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let key = state.v[op.x() as usize] & 0xF;
    skip_if(state, !state.keys[key as usize])
}

/// Vx = DT
pub fn moved(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let mut v = state.v;
    v[op.x() as usize] = state.delay_timer;
    Ok(State { v, ..*state })
}

/// await keypress for Vx
/// Stores the lowest pressed key, or rewinds the pc so this instruction runs again
pub fn keyd(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    match state.keys.iter().position(|&pressed| pressed) {
        Some(key) => {
            let mut v = state.v;
            v[op.x() as usize] = key as u8;
            Ok(State { v, ..*state })
        }
        None => Ok(State {
            pc: current_address(state),
            ..*state
        }),
    }
}

/// DT = Vx
pub fn loads(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    Ok(State {
        delay_timer: state.v[op.x() as usize],
        ..*state
    })
}

/// ST = Vx
pub fn ld(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    Ok(State {
        sound_timer: state.v[op.x() as usize],
        ..*state
    })
}

/// I += Vx
pub fn addi(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    Ok(State {
        i: state.i.wrapping_add(u16::from(state.v[op.x() as usize])),
        ..*state
    })
}

/// I = Vx * 5
/// Set I to the memory address of the glyph for the low nibble of Vx
/// See constants::SPRITE_SHEET for more details
pub fn ldspr(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let digit = u16::from(state.v[op.x() as usize] & 0xF);
    Ok(State {
        i: digit * GLYPH_SIZE,
        ..*state
    })
}

/// mem[I..I+3] = bcd(Vx)
/// Store BCD repr of Vx in memory starting at address i
pub fn bcd(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let value = state.v[op.x() as usize];
    let digits = [value / 100, value / 10 % 10, value % 10];
    let mut next = *state;
    for (offset, digit) in (0u16..).zip(digits) {
        next.write(state.i.wrapping_add(offset), digit);
    }
    Ok(next)
}

/// mem[I..=I+x] = V0..=Vx; I += x + 1
pub fn stor(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let mut next = *state;
    for register in 0..=op.x() as usize {
        next.write(next.i, state.v[register]);
        next.i = next.i.wrapping_add(1);
    }
    Ok(next)
}

/// V0..=Vx = mem[I..=I+x]; I += x + 1
pub fn read(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    let mut next = *state;
    for register in 0..=op.x() as usize {
        next.v[register] = next.read(next.i);
        next.i = next.i.wrapping_add(1);
    }
    Ok(next)
}

/// Anything the table doesn't recognise; the pc has already moved on
pub fn unknown(op: &dyn Opcode, state: &State, _rng: &mut dyn RngCore) -> Result<State, Chip8Error> {
    Err(Chip8Error::UnknownOpcode {
        opcode: op.word(),
        address: current_address(state),
    })
}
