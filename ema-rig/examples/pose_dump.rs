use ema_rig::{Config, PoseRig, Session};
use serde_json::json;
use std::path::PathBuf;

fn main() {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut positional = Vec::<String>::new();
    let mut bind_pose: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--emo" => {
                bind_pose = args.get(i + 1).map(PathBuf::from);
                i += 2;
            }
            "--config" => {
                config_path = args.get(i + 1).map(PathBuf::from);
                i += 2;
            }
            other => {
                positional.push(other.to_string());
                i += 1;
            }
        }
    }

    let Some(ema_path) = positional.first().map(PathBuf::from) else {
        eprintln!("usage: pose_dump <file.ema> [animation] [frame] [--emo file.emo] [--config cfg.json]");
        std::process::exit(2);
    };
    let frame: f32 = positional
        .get(2)
        .cloned()
        .unwrap_or_else(|| "0".to_string())
        .parse()
        .unwrap_or(0.0);

    let config = match config_path {
        Some(path) => {
            let text = std::fs::read_to_string(&path).expect("read config");
            Config::from_json_str(&text).expect("parse config")
        }
        None => Config::default(),
    };

    let mut session = Session::new(config);
    let container = session
        .load_animation_container("rig", &ema_path)
        .expect("load animation container");
    let animation = positional
        .get(1)
        .cloned()
        .or_else(|| container.animations.first().map(|a| a.name.clone()))
        .unwrap_or_default();
    let mut rig = PoseRig::from_skeleton(&container.skeleton);

    if let Some(path) = &bind_pose {
        let report = session
            .load_bind_pose_container("rig", path)
            .expect("load bind pose container");
        for warning in &report.warnings {
            eprintln!("warning: {warning}");
        }
    }

    let curves = session
        .import_curves("rig", &animation)
        .expect("import curves");
    let report = session
        .tick("rig", &mut rig, &animation, &curves, frame)
        .expect("evaluate frame");
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }

    let skeleton = &session.container("rig").expect("rig loaded").skeleton;
    let nodes: Vec<_> = report
        .evaluation
        .as_ref()
        .map(|evaluation| {
            evaluation
                .nodes
                .iter()
                .enumerate()
                .map(|(i, pose)| {
                    let node = &skeleton.nodes[i];
                    json!({
                        "i": i,
                        "name": node.name,
                        "parent": node.parent,
                        "bitFlag": node.bit_flag,
                        "passthrough": node.passthrough,
                        "translation": pose.translation.to_array(),
                        "rotation": pose.rotation.to_array(),
                        "scale": pose.scale.to_array(),
                        "world": pose.world.to_cols_array(),
                        "local": pose.local.to_cols_array(),
                        "output": pose.output.map(|m| m.to_cols_array()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let limbs: Vec<_> = report
        .limbs
        .iter()
        .map(|limb| {
            json!({
                "upper": skeleton.nodes[limb.upper].name,
                "lower": skeleton.nodes[limb.lower].name,
                "origin": limb.origin.to_array(),
                "joint": limb.joint.to_array(),
                "target": limb.target.to_array(),
            })
        })
        .collect();

    let out = json!({
        "animation": animation,
        "frame": frame,
        "nodes": nodes,
        "limbs": limbs,
        "warnings": report.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&out).expect("serialize"));
}
