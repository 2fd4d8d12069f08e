use buff_mirror::capture::Region;
use buff_mirror::library::{
    EntryKind, GeometryPatch, JsonLibrary, Library, LibraryData, PixelPos, PixelSize,
};

fn seed() -> &'static str {
    r#"{
        "buffs": [
            {"id": "regen", "image_path": "regen.png", "active": true}
        ],
        "debuffs": [
            {"id": "weak", "image_path": "weak.png"}
        ],
        "copy_areas": [
            {
                "id": "stats",
                "active": true,
                "capture": {"left": 10, "top": 20, "width": 50, "height": 25},
                "references": ["regen"]
            }
        ]
    }"#
}

#[test]
fn geometry_round_trips_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.json");
    std::fs::write(&path, seed()).unwrap();
    let lib = JsonLibrary::new(&path);

    assert!(lib.update_geometry(
        "regen",
        EntryKind::Buff,
        GeometryPatch {
            left: 640,
            top: 320,
            width: 48,
            height: 48,
        },
    ));

    let data = lib.load();
    let entry = data.icon_by_id("regen").unwrap();
    assert_eq!(entry.position, PixelPos { left: 640, top: 320 });
    assert_eq!(
        entry.size,
        PixelSize {
            width: 48,
            height: 48
        }
    );
    // untouched entries keep their defaults
    assert_eq!(data.icon_by_id("weak").unwrap().position, PixelPos::default());
}

#[test]
fn copy_area_geometry_is_persisted_per_kind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.json");
    std::fs::write(&path, seed()).unwrap();
    let lib = JsonLibrary::new(&path);

    assert!(lib.update_geometry(
        "stats",
        EntryKind::CopyArea,
        GeometryPatch {
            left: 800,
            top: 400,
            width: 120,
            height: 60,
        },
    ));
    // Asking for the wrong kind must not touch another bucket's entry.
    assert!(!lib.update_geometry(
        "stats",
        EntryKind::Buff,
        GeometryPatch {
            left: 0,
            top: 0,
            width: 1,
            height: 1,
        },
    ));

    let data = lib.load();
    let area = &data.copy_areas[0];
    assert_eq!(area.position, PixelPos { left: 800, top: 400 });
    assert_eq!(area.capture, Region::new(10, 20, 50, 25), "capture region untouched");
}

#[test]
fn unknown_id_is_rejected_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.json");
    std::fs::write(&path, seed()).unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let lib = JsonLibrary::new(&path);
    assert!(!lib.update_geometry(
        "ghost",
        EntryKind::Buff,
        GeometryPatch {
            left: 0,
            top: 0,
            width: 1,
            height: 1,
        },
    ));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn malformed_file_loads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.json");
    std::fs::write(&path, "{ this is not json").unwrap();

    let data = JsonLibrary::new(&path).load();
    assert!(data.buffs.is_empty());
    assert!(data.debuffs.is_empty());
    assert!(data.copy_areas.is_empty());
}

#[test]
fn serializes_back_in_snake_case() {
    let data: LibraryData = serde_json::from_str(seed()).unwrap();
    let json = serde_json::to_string(&data).unwrap();
    assert!(json.contains("\"copy_areas\""));
    assert!(json.contains("\"extend_bottom\""));
}
