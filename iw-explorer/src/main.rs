use std::env;
use std::process::ExitCode;

use log::error;

use iw::prelude::*;

const USAGE: &str = "usage: iw-explorer <asset_root> map|model|texture <name>";

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let [_, root, command, name] = args.as_slice() else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };

    let game_data = GameData::new(root);
    let result = match command.as_str() {
        "map" => show_map(&game_data, name),
        "model" => show_model(&game_data, name),
        "texture" => show_texture(&game_data, name),
        _ => {
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn show_map(game_data: &GameData, name: &str) -> Result<()> {
    let loaded = game_data.load_map(name)?;

    println!("map {} ({:?})", loaded.map.name, loaded.map.version);
    println!("  {} materials", loaded.materials.len());

    let vertices: usize = loaded.map.surfaces.iter().map(|s| s.vertices.len()).sum();
    let triangles: usize = loaded.map.surfaces.iter().map(|s| s.triangles.len()).sum();
    println!(
        "  {} surfaces, {} vertices, {} triangles",
        loaded.map.surfaces.len(),
        vertices,
        triangles
    );

    println!("  {} placements:", loaded.placements.len());
    for placement in &loaded.placements {
        println!(
            "    {} at ({:.1}, {:.1}, {:.1})",
            placement.model.name, placement.origin.x, placement.origin.y, placement.origin.z
        );
    }
    Ok(())
}

fn show_model(game_data: &GameData, name: &str) -> Result<()> {
    let model = game_data.load_model(name)?;

    println!("model {} ({:?})", model.name, model.version);
    println!("  {} bones", model.bones.len());
    for surface in &model.surfaces {
        println!(
            "  surface: {} vertices, {} triangles",
            surface.vertices.len(),
            surface.triangles.len()
        );
    }
    for material in &model.materials {
        println!("  material {}:", material.name);
        for texture in &material.textures {
            println!(
                "    {} {} ({}x{})",
                texture.texture_type, texture.name, texture.width, texture.height
            );
        }
    }
    Ok(())
}

fn show_texture(game_data: &GameData, name: &str) -> Result<()> {
    let iwi = game_data.load_texture(name)?;
    println!(
        "texture {}: {}x{}, {} bytes rgba",
        iwi.name,
        iwi.width,
        iwi.height,
        iwi.data.len()
    );
    Ok(())
}
