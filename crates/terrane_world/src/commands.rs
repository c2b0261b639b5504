use glam::IVec3;
use terrane_shared::block::{BlockId, BlockRegistry, Orientation};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Noop,
    Stop,
    Save,
    Stats,
    /// Moves the viewpoint to a world column.
    Teleport {
        x: f32,
        z: f32,
    },
    Set {
        pos: IVec3,
        block: String,
        orientation: Orientation,
    },
    Add {
        pos: IVec3,
        block: String,
        orientation: Orientation,
    },
    Look(IVec3),
    Help,
    InvalidUsage(String),
    Unknown(String),
}

const SET_USAGE: &str = "Usage: /set <x> <y> <z> <block> [front|back|left|right]";
const ADD_USAGE: &str = "Usage: /add <x> <y> <z> <block> [front|back|left|right]";
const LOOK_USAGE: &str = "Usage: /look <x> <y> <z>";
const TP_USAGE: &str = "Usage: /tp <x> <z>";

pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Noop;
    }

    let input = trimmed.strip_prefix('/').unwrap_or(trimmed);
    if input.is_empty() {
        return Command::Noop;
    }

    let mut head_tail = input.splitn(2, char::is_whitespace);
    let command = head_tail.next().unwrap_or_default().to_ascii_lowercase();
    let rest = head_tail.next().unwrap_or("").trim();
    let mut args = rest.split_whitespace();

    match command.as_str() {
        "stop" => Command::Stop,
        "save" => Command::Save,
        "stats" => Command::Stats,
        "tp" => match (args.next(), args.next(), args.next()) {
            (Some(x), Some(z), None) => match (x.parse::<f32>(), z.parse::<f32>()) {
                (Ok(x), Ok(z)) => Command::Teleport { x, z },
                _ => Command::InvalidUsage(TP_USAGE.to_string()),
            },
            _ => Command::InvalidUsage(TP_USAGE.to_string()),
        },
        "set" => match parse_placement(&mut args) {
            Some((pos, block, orientation)) => Command::Set {
                pos,
                block,
                orientation,
            },
            None => Command::InvalidUsage(SET_USAGE.to_string()),
        },
        "add" => match parse_placement(&mut args) {
            Some((pos, block, orientation)) => Command::Add {
                pos,
                block,
                orientation,
            },
            None => Command::InvalidUsage(ADD_USAGE.to_string()),
        },
        "look" => match (args.next(), args.next(), args.next(), args.next()) {
            (Some(x), Some(y), Some(z), None) => match parse_position(x, y, z) {
                Some(pos) => Command::Look(pos),
                None => Command::InvalidUsage(LOOK_USAGE.to_string()),
            },
            _ => Command::InvalidUsage(LOOK_USAGE.to_string()),
        },
        "help" => Command::Help,
        _ => Command::Unknown(input.to_string()),
    }
}

/// `<x> <y> <z> <block> [orientation]`, facing front when omitted.
fn parse_placement<'a>(
    args: &mut impl Iterator<Item = &'a str>,
) -> Option<(IVec3, String, Orientation)> {
    let (x, y, z, block) = (args.next()?, args.next()?, args.next()?, args.next()?);
    let orientation = match args.next() {
        Some(facing) => parse_orientation(facing)?,
        None => Orientation::FRONT,
    };
    if args.next().is_some() {
        return None;
    }
    Some((parse_position(x, y, z)?, block.to_string(), orientation))
}

fn parse_position(x: &str, y: &str, z: &str) -> Option<IVec3> {
    Some(IVec3::new(x.parse().ok()?, y.parse().ok()?, z.parse().ok()?))
}

fn parse_orientation(name: &str) -> Option<Orientation> {
    match name.to_ascii_lowercase().as_str() {
        "front" => Some(Orientation::FRONT),
        "back" => Some(Orientation::BACK),
        "left" => Some(Orientation::LEFT),
        "right" => Some(Orientation::RIGHT),
        _ => None,
    }
}

/// Accepts a registered block name or a numeric id.
pub fn resolve_block(registry: &BlockRegistry, name: &str) -> Option<BlockId> {
    if let Some(id) = registry.get_by_name(name) {
        return Some(id);
    }
    let id = BlockId(name.parse::<u8>().ok()?);
    registry.is_known(id).then_some(id)
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use super::{parse_command, resolve_block, Command};
    use terrane_shared::block::{register_default_blocks, BlockId, Orientation};

    #[test]
    fn parses_world_commands() {
        assert_eq!(parse_command("  "), Command::Noop);
        assert_eq!(parse_command("/stop"), Command::Stop);
        assert_eq!(parse_command("SAVE"), Command::Save);
        assert_eq!(parse_command("/stats"), Command::Stats);
        assert_eq!(
            parse_command("/tp 800.5 -12"),
            Command::Teleport { x: 800.5, z: -12.0 }
        );
        assert_eq!(
            parse_command("/set 10 64 -2 furnace left"),
            Command::Set {
                pos: IVec3::new(10, 64, -2),
                block: "furnace".to_string(),
                orientation: Orientation::LEFT,
            }
        );
        assert_eq!(
            parse_command("/set 1 2 3 stone"),
            Command::Set {
                pos: IVec3::new(1, 2, 3),
                block: "stone".to_string(),
                orientation: Orientation::FRONT,
            }
        );
        assert_eq!(
            parse_command("/add 4 70 4 9"),
            Command::Add {
                pos: IVec3::new(4, 70, 4),
                block: "9".to_string(),
                orientation: Orientation::FRONT,
            }
        );
        assert_eq!(
            parse_command("/add 4 70 4 furnace Back"),
            Command::Add {
                pos: IVec3::new(4, 70, 4),
                block: "furnace".to_string(),
                orientation: Orientation::BACK,
            }
        );
        assert_eq!(parse_command("/look 0 0 0"), Command::Look(IVec3::ZERO));
    }

    #[test]
    fn reports_usage_errors() {
        assert!(matches!(parse_command("/tp 1"), Command::InvalidUsage(_)));
        assert!(matches!(
            parse_command("/set 1 2 three stone"),
            Command::InvalidUsage(_)
        ));
        assert!(matches!(
            parse_command("/set 1 2 3 stone upward"),
            Command::InvalidUsage(_)
        ));
        assert!(matches!(
            parse_command("/add 1 2 3 furnace sideways"),
            Command::InvalidUsage(_)
        ));
        assert!(matches!(
            parse_command("/add 1 2 3 furnace left extra"),
            Command::InvalidUsage(_)
        ));
        assert!(matches!(parse_command("/look 1 2"), Command::InvalidUsage(_)));
        assert_eq!(parse_command("/fly"), Command::Unknown("fly".to_string()));
    }

    #[test]
    fn resolves_block_names_and_ids() {
        let registry = register_default_blocks();
        assert_eq!(resolve_block(&registry, "glass"), Some(BlockId::GLASS));
        assert_eq!(resolve_block(&registry, "19"), Some(BlockId::FURNACE));
        assert_eq!(resolve_block(&registry, "250"), None);
        assert_eq!(resolve_block(&registry, "unobtainium"), None);
    }
}
